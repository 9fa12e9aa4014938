//! Interfaces to the external collaborators.
//!
//! The pipeline only ever talks to the media downloader, the separation
//! engine, and the metadata/lyrics sources through these traits. Production
//! adapters live in [`crate::services::media`], [`crate::services::itunes`]
//! and [`crate::services::lrclib`]; tests plug in the stubs from
//! [`crate::services::stubs`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cooperative cancellation signal threaded through every blocking provider
/// call. Flipped to `true` once when the owning job is cancelled.
pub type CancelSignal = tokio::sync::watch::Receiver<bool>;

/// Create a signal pair. The sender side is held by the dispatcher.
pub fn cancel_pair() -> (tokio::sync::watch::Sender<bool>, CancelSignal) {
    tokio::sync::watch::channel(false)
}

pub fn is_cancelled(signal: &CancelSignal) -> bool {
    *signal.borrow()
}

/// Media download result.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// Absolute path of the downloaded original audio.
    pub original: PathBuf,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("media unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported format: {0}")]
    Format(String),
    #[error("cancelled")]
    Cancelled,
}

/// External media downloader ("Fetcher").
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the media for `video_id` into `dest_dir` as the original
    /// audio file. Must be idempotent: re-fetching over an existing complete
    /// file is allowed to short-circuit.
    async fn fetch(
        &self,
        video_id: &str,
        dest_dir: &Path,
        cancel: CancelSignal,
    ) -> Result<FetchedMedia, FetchError>;
}

/// Separation result: both stems, already written under the song directory.
#[derive(Debug, Clone)]
pub struct SeparatedStems {
    pub vocals: PathBuf,
    pub instrumental: PathBuf,
}

#[derive(Debug, Error)]
pub enum SeparatorError {
    #[error("separator unavailable: {0}")]
    Unavailable(String),
    #[error("separation failed: {0}")]
    Failed(String),
    #[error("cancelled")]
    Cancelled,
}

/// External audio source-separation engine ("Separator").
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(
        &self,
        original: &Path,
        dest_dir: &Path,
        cancel: CancelSignal,
    ) -> Result<SeparatedStems, SeparatorError>;
}

/// One metadata search hit.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataCandidate {
    pub track_name: String,
    pub artist_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider error: {0}")]
    Failed(String),
}

/// External metadata source (iTunes-shaped search).
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MetadataCandidate>, ProviderError>;
}

/// One lyrics search hit.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsCandidate {
    pub plain_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    pub source: String,
    #[serde(rename = "durationHint", skip_serializing_if = "Option::is_none")]
    pub duration_hint_ms: Option<i64>,
}

/// External lyrics source.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn search(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
    ) -> Result<Vec<LyricsCandidate>, ProviderError>;
}
