//! Liveness probe; independent of device state and the router prefix.

use actix_web::{web, HttpResponse};
use serde_json::json;

pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "up" }))
}
