//! YouTube ingest endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::ErrorResponse;
use crate::{AppError, AppState};

/// Body of `POST /youtube/download`. The song row must already exist:
/// creation and enqueueing are separate calls so the worker can never race a
/// half-created song.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeDownloadRequest {
    pub song_id: Option<Uuid>,
    pub video_id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeDownloadResponse {
    pub job_id: Uuid,
    pub status: &'static str,
}

pub async fn youtube_download_handler(
    State(state): State<AppState>,
    Json(request): Json<YoutubeDownloadRequest>,
) -> Response {
    let Some(song_id) = request.song_id else {
        return AppError::missing("songId").into_response();
    };
    let Some(video_or_url) = request.video_id.as_deref().or(request.url.as_deref()) else {
        return AppError::missing("videoId").into_response();
    };

    match state
        .coordinator
        .enqueue_youtube_job(song_id, video_or_url)
        .await
    {
        Ok(job) => Json(YoutubeDownloadResponse {
            job_id: job.id,
            status: "pending",
        })
        .into_response(),
        // Enqueueing against a song that does not exist is a caller mistake,
        // not a lookup miss: 400, with the not-found code preserved.
        Err(AppError::NotFound { resource }) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("{} not found", resource),
                code: "RESOURCE_NOT_FOUND".to_string(),
                details: Some(json!({ "songId": song_id })),
            }),
        )
            .into_response(),
        Err(other) => other.into_response(),
    }
}
