use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{error::ApiResult, main_lib::AppState};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    jobs: usize,
}

/// Liveness plus a cheap check that the job registry is readable.
async fn healthz(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let jobs = state.scheduler.list_jobs()?.len();
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/healthz", get(healthz))
}
