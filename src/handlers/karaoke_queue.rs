//! Karaoke queue endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
};
use validator::Validate;

use crate::models::{AddToQueueRequest, QueueEntry, ReorderQueueRequest};
use crate::{AppError, AppState, Result};

pub async fn list_queue_handler(State(state): State<AppState>) -> Result<Json<Vec<QueueEntry>>> {
    Ok(Json(state.coordinator.list_queue().await?))
}

pub async fn add_to_queue_handler(
    State(state): State<AppState>,
    Json(request): Json<AddToQueueRequest>,
) -> Result<Json<QueueEntry>> {
    request.validate()?;
    let entry = state
        .coordinator
        .add_to_queue(request.song_id, &request.singer_name)
        .await?;
    Ok(Json(entry))
}

pub async fn remove_queue_entry_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    state.coordinator.remove_queue_entry(entry_id).await?;
    Ok(Json(serde_json::json!({ "removed": entry_id })))
}

pub async fn reorder_queue_handler(
    State(state): State<AppState>,
    Json(request): Json<ReorderQueueRequest>,
) -> Result<Json<Vec<QueueEntry>>> {
    if request.order.is_empty() {
        return Err(AppError::missing("order"));
    }
    Ok(Json(state.coordinator.reorder_queue(&request.order).await?))
}

pub async fn advance_queue_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let now_playing = state.coordinator.advance_queue().await?;
    Ok(Json(serde_json::json!({ "nowPlaying": now_playing })))
}
