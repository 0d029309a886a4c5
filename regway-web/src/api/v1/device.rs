use std::sync::Arc;

use actix_web::web::{self, Path};
use actix_web_validator::Json;
use regway_error::WebResult;
use regway_models::{
    domain::prelude::{
        DeviceInfo, LatestView, WriteRegisterPayload, WriteRegistersPayload, WriteReport,
        WriteResultView,
    },
    web::WebResponse,
};
use tracing::instrument;

use crate::AppState;

pub(super) const ROUTER_PREFIX: &str = "/device";

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/list", web::get().to(list))
        .route("/{id}/latest", web::get().to(latest))
        .route("/{id}/register/{name}", web::post().to(write_register))
        .route("/{id}/registers", web::post().to(write_registers));
}

pub async fn list(state: web::Data<Arc<AppState>>) -> WebResult<WebResponse<Vec<DeviceInfo>>> {
    Ok(WebResponse::ok(state.gateway.list_devices()))
}

/// Last known values; an offline device still answers with its status.
pub async fn latest(
    id: Path<String>,
    state: web::Data<Arc<AppState>>,
) -> WebResult<WebResponse<LatestView>> {
    Ok(WebResponse::ok(state.gateway.get_latest(&id)?))
}

#[instrument(name = "api-write-register", skip_all)]
pub async fn write_register(
    path: Path<(String, String)>,
    payload: Json<WriteRegisterPayload>,
    state: web::Data<Arc<AppState>>,
) -> WebResult<WebResponse<WriteResultView>> {
    let (id, name) = path.into_inner();
    let report = state
        .gateway
        .set_register(&id, &name, payload.value)
        .await?;
    Ok(write_response(report))
}

#[instrument(name = "api-write-registers", skip_all)]
pub async fn write_registers(
    id: Path<String>,
    payload: Json<WriteRegistersPayload>,
    state: web::Data<Arc<AppState>>,
) -> WebResult<WebResponse<WriteResultView>> {
    let report = state
        .gateway
        .set_registers(&id, payload.into_inner().writes)
        .await?;
    Ok(write_response(report))
}

/// A device-side failure is still a well-formed answer: status 200, `ok = false`.
fn write_response(report: WriteReport) -> WebResponse<WriteResultView> {
    let view = WriteResultView::from(report);
    if view.ok {
        WebResponse::ok(view)
    } else {
        let message = view.message.clone();
        WebResponse::failed_with(&message, view)
    }
}
