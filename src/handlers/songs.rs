//! Library endpoints: songs, search, artists.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Artist, CreateSongRequest, Page, Song, SongPatch};
use crate::services::song_store::ListOptions;
use crate::{AppError, AppState, Result};

/// Query parameters shared by the paged listings.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// `sort_by` on the library listing, `sort` on the by-artist listing.
    #[serde(alias = "sort")]
    pub sort_by: Option<String>,
    pub direction: Option<String>,
}

fn default_limit() -> i64 {
    50
}

impl ListQuery {
    fn options(&self) -> ListOptions {
        ListOptions {
            offset: self.offset,
            limit: self.limit,
            sort_by: self.sort_by.clone(),
            direction: self.direction.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub sort: Option<String>,
    pub direction: Option<String>,
    #[serde(default)]
    pub group_by_artist: bool,
}

#[derive(Debug, Deserialize)]
pub struct ArtistsQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_artist_limit")]
    pub limit: i64,
}

fn default_artist_limit() -> i64 {
    100
}

pub async fn list_songs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Song>>> {
    let page = state.songs.list_songs(&query.options()).await?;
    Ok(Json(page))
}

pub async fn search_songs_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Page<Song>>> {
    if query.q.trim().is_empty() {
        return Err(AppError::missing("q"));
    }
    let page = state
        .songs
        .search_songs(&query.q, query.offset, query.limit, query.group_by_artist)
        .await?;
    Ok(Json(page))
}

pub async fn list_artists_handler(
    State(state): State<AppState>,
    Query(query): Query<ArtistsQuery>,
) -> Result<Json<Page<Artist>>> {
    let page = state
        .songs
        .list_artists(query.search.as_deref(), query.offset, query.limit)
        .await?;
    Ok(Json(page))
}

pub async fn songs_by_artist_handler(
    State(state): State<AppState>,
    Path(artist_name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Song>>> {
    let page = state
        .songs
        .list_songs_by_artist(&artist_name, &query.options())
        .await?;
    Ok(Json(page))
}

pub async fn get_song_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Song>> {
    Ok(Json(state.songs.get_song(id).await?))
}

pub async fn create_song_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSongRequest>,
) -> Result<Json<Song>> {
    let song = state.coordinator.create_song(&request).await?;
    Ok(Json(song))
}

pub async fn patch_song_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SongPatch>,
) -> Result<Json<Song>> {
    if patch.is_empty() {
        return Err(AppError::invalid("body", "no recognized fields to update"));
    }
    Ok(Json(state.songs.update_song(id, &patch).await?))
}

pub async fn delete_song_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.coordinator.delete_song(id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
