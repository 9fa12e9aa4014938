//! Live performance controls shared by every connected client.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lyric display size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsSize {
    Small,
    Medium,
    Large,
}

/// The authoritative performance-control state. A single in-process record;
/// every mutation goes through the coordinator and is broadcast to all
/// performance clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceState {
    pub vocal_volume: f64,
    pub instrumental_volume: f64,
    pub lyrics_size: LyricsSize,
    pub lyrics_offset_ms: i64,
    pub is_playing: bool,
    pub current_entry_id: Option<i64>,
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self {
            vocal_volume: 0.0,
            instrumental_volume: 1.0,
            lyrics_size: LyricsSize::Medium,
            lyrics_offset_ms: 0,
            is_playing: false,
            current_entry_id: None,
        }
    }
}

/// A control change requested by a client. Absent fields are untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceControlPatch {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocal_volume: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrumental_volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_size: Option<LyricsSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_offset_ms: Option<i64>,
}

impl PerformanceControlPatch {
    pub fn is_empty(&self) -> bool {
        self.vocal_volume.is_none()
            && self.instrumental_volume.is_none()
            && self.lyrics_size.is_none()
            && self.lyrics_offset_ms.is_none()
    }
}
