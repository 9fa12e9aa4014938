//! Karaoke queue entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEntryStatus {
    Queued,
    Playing,
    Played,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryStatus::Queued => "queued",
            QueueEntryStatus::Playing => "playing",
            QueueEntryStatus::Played => "played",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "playing" => Some(Self::Playing),
            "played" => Some(Self::Played),
            _ => None,
        }
    }
}

/// One singer's spot in the karaoke queue. Positions of queued entries are
/// contiguous from 1; playing/played entries carry no position.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(rename = "entryId")]
    pub id: i64,
    pub song_id: Uuid,
    pub singer_name: String,
    pub position: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: QueueStatusColumn,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub played_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueStatusColumn(pub QueueEntryStatus);

impl TryFrom<String> for QueueStatusColumn {
    type Error = String;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        QueueEntryStatus::parse(&raw)
            .map(QueueStatusColumn)
            .ok_or_else(|| format!("unknown queue status {:?}", raw))
    }
}

impl QueueEntry {
    pub fn status(&self) -> QueueEntryStatus {
        self.status.0
    }
}

/// Body of `POST /karaoke-queue`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueRequest {
    pub song_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub singer_name: String,
}

/// Body of `PUT /karaoke-queue/reorder`: the desired order of all currently
/// queued entry ids, first to play first.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderQueueRequest {
    pub order: Vec<i64>,
}
