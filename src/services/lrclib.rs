//! LRCLIB-shaped lyrics adapter.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::providers::{LyricsCandidate, LyricsProvider, ProviderError};

pub struct LrclibLyricsProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibLyricsProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("open-karaoke-studio/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    language: Option<String>,
}

impl LrclibRecord {
    fn into_candidate(self) -> Option<LyricsCandidate> {
        let synced_text = self.synced_lyrics.filter(|s| !s.trim().is_empty());
        let plain_text = match self.plain_lyrics.filter(|s| !s.trim().is_empty()) {
            Some(plain) => plain,
            // A synced-only record still yields plain text by stripping tags.
            None => {
                let synced = synced_text.as_deref()?;
                crate::lrc::parse(synced)
                    .ok()?
                    .into_iter()
                    .map(|l| l.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        Some(LyricsCandidate {
            plain_text,
            synced_text,
            language_code: self.language,
            source: "lrclib".to_string(),
            duration_hint_ms: self.duration.map(|s| (s * 1000.0) as i64),
        })
    }
}

#[async_trait]
impl LyricsProvider for LrclibLyricsProvider {
    async fn search(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
    ) -> Result<Vec<LyricsCandidate>, ProviderError> {
        let mut url = format!(
            "{}/api/search?artist_name={}&track_name={}",
            self.base_url,
            urlencoding::encode(artist),
            urlencoding::encode(title),
        );
        if let Some(album) = album {
            url.push_str("&album_name=");
            url.push_str(&urlencoding::encode(album));
        }

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Unavailable(e.to_string())
            } else {
                ProviderError::Failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ProviderError::Failed(format!(
                "lyrics search returned {}",
                response.status()
            )));
        }

        let records: Vec<LrclibRecord> = response
            .json()
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?;

        Ok(records
            .into_iter()
            .filter_map(LrclibRecord::into_candidate)
            .collect())
    }
}
