//! V1 API routes
mod device;
mod history;
mod ws;

use actix_web::web;

pub fn configure_v1_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope(device::ROUTER_PREFIX).configure(device::configure_routes))
        .service(web::scope(history::ROUTER_PREFIX).configure(history::configure_routes))
        .service(web::scope(ws::ROUTER_PREFIX).configure(ws::configure_routes));
}
