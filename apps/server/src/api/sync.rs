//! Sync job control and the run log.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::main_lib::AppState;
use famledger_core::sync::{SyncJob, SyncJobDefinition, SyncRunResult};

const DEFAULT_RUN_LIMIT: i64 = 20;
const MAX_RUN_LIMIT: i64 = 200;

async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<SyncJob>>> {
    Ok(Json(state.scheduler.list_jobs()?))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SyncJob>> {
    Ok(Json(state.scheduler.get_job(&job_id)?))
}

async fn register_job(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<SyncJobDefinition>,
) -> ApiResult<(StatusCode, Json<SyncJob>)> {
    let job = state.scheduler.register(definition.into_job()?)?;
    info!("Registered sync job '{}' via API", job.id);
    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TriggerQuery {
    #[serde(default)]
    wait: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerAccepted {
    job_id: String,
    status: &'static str,
}

/// Start a run now. With `?wait=true` the response is the finished run.
async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<TriggerQuery>,
) -> ApiResult<Response> {
    if query.wait {
        let run: SyncRunResult = state.scheduler.trigger_and_wait(&job_id).await?;
        return Ok(Json(run).into_response());
    }

    state.scheduler.trigger(&job_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerAccepted {
            job_id,
            status: "triggered",
        }),
    )
        .into_response())
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SyncJob>> {
    Ok(Json(state.scheduler.start(&job_id)?))
}

async fn stop_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SyncJob>> {
    Ok(Json(state.scheduler.stop(&job_id)?))
}

async fn remove_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.scheduler.remove(&job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunsQuery {
    job_id: Option<String>,
    limit: Option<i64>,
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<SyncRunResult>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUN_LIMIT)
        .clamp(1, MAX_RUN_LIMIT);
    Ok(Json(
        state
            .scheduler
            .recent_runs(query.job_id.as_deref(), limit)?,
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/jobs", get(list_jobs).post(register_job))
        .route("/sync/jobs/{id}", get(get_job).delete(remove_job))
        .route("/sync/jobs/{id}/trigger", post(trigger_job))
        .route("/sync/jobs/{id}/start", post(start_job))
        .route("/sync/jobs/{id}/stop", post(stop_job))
        .route("/sync/runs", get(list_runs))
}
