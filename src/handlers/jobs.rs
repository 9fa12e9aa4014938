//! Job listing and lifecycle endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::models::{Job, JobStatusSummary};
use crate::{AppState, Result};

pub async fn list_jobs_handler(State(state): State<AppState>) -> Result<Json<Vec<Job>>> {
    Ok(Json(state.jobs.list_jobs().await?))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>> {
    Ok(Json(state.jobs.get_job(id).await?))
}

pub async fn job_status_handler(
    State(state): State<AppState>,
) -> Result<Json<JobStatusSummary>> {
    Ok(Json(state.jobs.status_summary().await?))
}

pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>> {
    Ok(Json(state.coordinator.cancel_job(id).await?))
}

pub async fn dismiss_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.jobs.dismiss_job(id).await?;
    Ok(Json(serde_json::json!({ "dismissed": id })))
}
