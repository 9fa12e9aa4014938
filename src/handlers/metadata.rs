//! Metadata search proxy.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::services::providers::MetadataCandidate;
use crate::{AppError, AppState, Result};

#[derive(Debug, Deserialize)]
pub struct MetadataSearchQuery {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

pub async fn search_metadata_handler(
    State(state): State<AppState>,
    Query(query): Query<MetadataSearchQuery>,
) -> Result<Json<Vec<MetadataCandidate>>> {
    let candidates = state
        .metadata_provider
        .search(
            &query.artist,
            &query.title,
            query.album.as_deref(),
            query.limit.min(50),
        )
        .await
        .map_err(|e| AppError::Upstream {
            service: "metadata".to_string(),
            message: e.to_string(),
        })?;
    Ok(Json(candidates))
}
