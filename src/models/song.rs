//! Song rows and their request/response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Where a song's audio came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongSource {
    Upload,
    Youtube,
}

impl SongSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongSource::Upload => "upload",
            SongSource::Youtube => "youtube",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upload" => Some(SongSource::Upload),
            "youtube" => Some(SongSource::Youtube),
            _ => None,
        }
    }
}

/// Lifecycle of a song through the ingest pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl SongStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Pending => "pending",
            SongStatus::Downloading => "downloading",
            SongStatus::Processing => "processing",
            SongStatus::Completed => "completed",
            SongStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(SongStatus::Pending),
            "downloading" => Some(SongStatus::Downloading),
            "processing" => Some(SongStatus::Processing),
            "completed" => Some(SongStatus::Completed),
            "failed" => Some(SongStatus::Failed),
            _ => None,
        }
    }
}

/// Relative file keys under the song's library directory. The mapping is the
/// source of truth for "this file is ready"; files on disk that are not
/// referenced here are treated as incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrumental: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl SongPaths {
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "original" => self.original.as_deref(),
            "vocals" => self.vocals.as_deref(),
            "instrumental" => self.instrumental.as_deref(),
            "cover" => self.cover.as_deref(),
            "thumbnail" => self.thumbnail.as_deref(),
            _ => None,
        }
    }
}

/// iTunes identifiers attached by metadata enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItunesIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
}

/// One candidate thumbnail reported by the fetcher, best-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// A library song.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    #[serde(skip)]
    pub artist_normalized: String,
    pub album: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "duration")]
    pub duration_ms: Option<i64>,
    #[sqlx(try_from = "String")]
    pub source: SourceColumn,
    pub source_url: Option<String>,
    pub video_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: StatusColumn,
    #[sqlx(json)]
    pub paths: SongPaths,
    #[sqlx(json(nullable))]
    pub itunes_ids: Option<ItunesIds>,
    #[sqlx(json)]
    #[serde(rename = "youtubeThumbnailUrls")]
    pub thumbnails: Vec<Thumbnail>,
    pub date_added: DateTime<Utc>,
    pub favorite: bool,
}

/// Newtype wrappers so sqlx TEXT columns decode through `SongSource::parse` /
/// `SongStatus::parse` without hand-writing `FromRow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceColumn(pub SongSource);

impl TryFrom<String> for SourceColumn {
    type Error = String;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        SongSource::parse(&raw)
            .map(SourceColumn)
            .ok_or_else(|| format!("unknown song source {:?}", raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusColumn(pub SongStatus);

impl TryFrom<String> for StatusColumn {
    type Error = String;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        SongStatus::parse(&raw)
            .map(StatusColumn)
            .ok_or_else(|| format!("unknown song status {:?}", raw))
    }
}

impl Song {
    pub fn source(&self) -> SongSource {
        self.source.0
    }

    pub fn status(&self) -> SongStatus {
        self.status.0
    }
}

/// Body of `POST /songs`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSongRequest {
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    #[validate(length(min = 1, max = 512))]
    pub artist: String,
    pub album: Option<String>,
    pub source: SongSource,
    pub source_url: Option<String>,
    pub video_id: Option<String>,
}

/// Body of `PATCH /songs/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "duration")]
    pub duration_ms: Option<i64>,
    pub favorite: Option<bool>,
}

impl SongPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.year.is_none()
            && self.genre.is_none()
            && self.language.is_none()
            && self.duration_ms.is_none()
            && self.favorite.is_none()
    }
}

/// A page of results with the total the filters matched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip_json() {
        let paths = SongPaths {
            original: Some("original.mp3".into()),
            vocals: Some("vocals.mp3".into()),
            instrumental: None,
            cover: None,
            thumbnail: None,
        };
        let value = serde_json::to_value(&paths).unwrap();
        assert_eq!(value["original"], "original.mp3");
        assert!(value.get("instrumental").is_none());
        let back: SongPaths = serde_json::from_value(value).unwrap();
        assert_eq!(back, paths);
    }

    #[test]
    fn source_column_rejects_unknown() {
        assert!(SourceColumn::try_from("youtube".to_string()).is_ok());
        assert!(SourceColumn::try_from("cassette".to_string()).is_err());
    }
}
