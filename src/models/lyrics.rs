//! Lyrics rows, one per song.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored lyrics for a song. `synced_text`, when present, is an LRC document
/// whose timestamps never decrease.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lyrics {
    pub song_id: Uuid,
    pub plain_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "durationHint", skip_serializing_if = "Option::is_none")]
    pub duration_hint_ms: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /lyrics/{songId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLyricsRequest {
    pub plain_text: String,
    pub synced_text: Option<String>,
    pub language_code: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "durationHint")]
    pub duration_hint_ms: Option<i64>,
}
