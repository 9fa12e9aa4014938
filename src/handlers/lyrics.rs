//! Lyrics endpoints: stored lyrics plus the provider search proxy.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Lyrics, SetLyricsRequest};
use crate::services::providers::LyricsCandidate;
use crate::{AppError, AppState, Result};

pub async fn get_lyrics_handler(
    State(state): State<AppState>,
    Path(song_id): Path<Uuid>,
) -> Result<Json<Lyrics>> {
    Ok(Json(state.songs.get_lyrics(song_id).await?))
}

pub async fn set_lyrics_handler(
    State(state): State<AppState>,
    Path(song_id): Path<Uuid>,
    Json(request): Json<SetLyricsRequest>,
) -> Result<Json<Lyrics>> {
    if request.plain_text.trim().is_empty() {
        return Err(AppError::missing("plainText"));
    }
    Ok(Json(state.songs.set_lyrics(song_id, &request).await?))
}

#[derive(Debug, Deserialize)]
pub struct LyricsSearchQuery {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
}

/// Proxy to the lyrics source; nothing is persisted here.
pub async fn search_lyrics_handler(
    State(state): State<AppState>,
    Query(query): Query<LyricsSearchQuery>,
) -> Result<Json<Vec<LyricsCandidate>>> {
    let candidates = state
        .lyrics_provider
        .search(&query.artist, &query.title, query.album.as_deref())
        .await
        .map_err(|e| AppError::Upstream {
            service: "lyrics".to_string(),
            message: e.to_string(),
        })?;
    Ok(Json(candidates))
}
