//! Scripted stand-ins for the external collaborators, used by tests and by
//! development setups without the real tools installed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::media::{INSTRUMENTAL_FILE, ORIGINAL_FILE, VOCALS_FILE};
use super::providers::{
    CancelSignal, FetchError, FetchedMedia, Fetcher, LyricsCandidate, LyricsProvider,
    MetadataCandidate, MetadataProvider, ProviderError, SeparatedStems, Separator, SeparatorError,
};

/// Fetcher that writes a placeholder original file. With a configured delay
/// it becomes cancellable mid-download, which the cancellation tests rely
/// on.
pub struct StubFetcher {
    pub delay: Duration,
    pub fail_with: Mutex<Option<FetchError>>,
    pub calls: AtomicUsize,
    pub duration_ms: Option<i64>,
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_with: Mutex::new(None),
            calls: AtomicUsize::new(0),
            duration_ms: Some(180_000),
        }
    }
}

impl StubFetcher {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(
        &self,
        video_id: &str,
        dest_dir: &Path,
        mut cancel: CancelSignal,
    ) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.changed() => return Err(FetchError::Cancelled),
            }
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let target = dest_dir.join(ORIGINAL_FILE);
        tokio::fs::write(&target, format!("audio:{}", video_id))
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(FetchedMedia {
            original: target,
            duration_ms: self.duration_ms,
        })
    }
}

/// Separator that writes placeholder stems.
pub struct StubSeparator {
    pub delay: Duration,
    pub fail_with: Mutex<Option<SeparatorError>>,
    pub calls: AtomicUsize,
}

impl Default for StubSeparator {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_with: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl StubSeparator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing(error: SeparatorError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Separator for StubSeparator {
    async fn separate(
        &self,
        original: &Path,
        dest_dir: &Path,
        mut cancel: CancelSignal,
    ) -> Result<SeparatedStems, SeparatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }
        if !original.exists() {
            return Err(SeparatorError::Failed(format!(
                "missing original {}",
                original.display()
            )));
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.changed() => return Err(SeparatorError::Cancelled),
            }
        }

        let vocals = dest_dir.join(VOCALS_FILE);
        let instrumental = dest_dir.join(INSTRUMENTAL_FILE);
        for path in [&vocals, &instrumental] {
            tokio::fs::write(path, "stem")
                .await
                .map_err(|e| SeparatorError::Failed(e.to_string()))?;
        }

        Ok(SeparatedStems {
            vocals,
            instrumental,
        })
    }
}

/// Metadata provider answering from a fixed candidate list.
#[derive(Default)]
pub struct StubMetadataProvider {
    pub candidates: Vec<MetadataCandidate>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MetadataProvider for StubMetadataProvider {
    async fn search(
        &self,
        _artist: &str,
        _title: &str,
        _album: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MetadataCandidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Unavailable("stub outage".to_string()));
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

/// Lyrics provider answering from a fixed candidate list.
#[derive(Default)]
pub struct StubLyricsProvider {
    pub candidates: Vec<LyricsCandidate>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl LyricsProvider for StubLyricsProvider {
    async fn search(
        &self,
        _artist: &str,
        _title: &str,
        _album: Option<&str>,
    ) -> Result<Vec<LyricsCandidate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Unavailable("stub outage".to_string()));
        }
        Ok(self.candidates.clone())
    }
}
