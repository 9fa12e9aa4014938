//! Binary file endpoints: stem downloads, thumbnails, covers.
//!
//! The song's path mapping is the source of truth: a file that exists on
//! disk but is not referenced there is still being written and is served as
//! a 404.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::services::media::song_dir;
use crate::{AppError, AppState, Result};

async fn serve_song_file(state: &AppState, song_id: Uuid, key: &str) -> Result<Response> {
    let song = state.songs.get_song(song_id).await?;
    let Some(relative) = song.paths.get(key) else {
        return Err(AppError::not_found("File"));
    };

    let path = song_dir(&state.config.storage.library_dir, song_id).join(relative);
    if !path.is_file() {
        tracing::warn!(song_id = %song_id, key, path = %path.display(), "path mapping points at a missing file");
        return Err(AppError::not_found("File"));
    }

    let request = Request::builder()
        .body(Body::empty())
        .map_err(|e| AppError::internal(e.to_string()))?;
    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| AppError::internal(format!("file serve failed: {}", e)))?;
    Ok(response.into_response())
}

/// `GET /songs/{id}/download/{vocals|instrumental|original}`
pub async fn download_handler(
    State(state): State<AppState>,
    Path((id, track)): Path<(Uuid, String)>,
) -> Result<Response> {
    match track.as_str() {
        "vocals" | "instrumental" | "original" => serve_song_file(&state, id, &track).await,
        other => Err(AppError::invalid(
            "track",
            format!("unknown track {:?}", other),
        )),
    }
}

/// `GET /songs/{id}/thumbnail[.ext]`
pub async fn thumbnail_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    serve_song_file(&state, id, "thumbnail").await
}

/// `GET /songs/{id}/cover.jpg`
pub async fn cover_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    serve_song_file(&state, id, "cover").await
}
