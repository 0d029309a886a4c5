use std::sync::Arc;

use actix_web::web;
use actix_web_validator::Query;
use regway_error::WebResult;
use regway_models::{
    domain::prelude::{HistoryQuery, HistoryRow},
    web::WebResponse,
};
use tracing::instrument;

use crate::AppState;

pub(super) const ROUTER_PREFIX: &str = "/history";

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(query));
}

/// Rows of one measurement; bounds default to the trailing week.
#[instrument(name = "api-history", skip_all, fields(measurement = %params.measurement))]
pub async fn query(
    params: Query<HistoryQuery>,
    state: web::Data<Arc<AppState>>,
) -> WebResult<WebResponse<Vec<HistoryRow>>> {
    let rows = state.gateway.get_history(params.into_inner()).await?;
    Ok(WebResponse::ok(rows))
}
