//! WebSocket endpoints.
mod monitor;

use actix_web::web;

pub(super) const ROUTER_PREFIX: &str = "/ws";

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/monitor", web::get().to(monitor::monitor_ws));
}
