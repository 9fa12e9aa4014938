//! iTunes Search API metadata adapter.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::providers::{MetadataCandidate, MetadataProvider, ProviderError};

pub struct ItunesMetadataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ItunesMetadataProvider {
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
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    track_name: Option<String>,
    artist_name: Option<String>,
    collection_name: Option<String>,
    track_id: Option<i64>,
    artist_id: Option<i64>,
    collection_id: Option<i64>,
    primary_genre_name: Option<String>,
    release_date: Option<String>,
    country: Option<String>,
}

impl SearchResult {
    fn into_candidate(self) -> Option<MetadataCandidate> {
        let track_name = self.track_name?;
        let artist_name = self.artist_name?;
        // "2019-05-24T12:00:00Z" -> 2019
        let year = self
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok());
        Some(MetadataCandidate {
            track_name,
            artist_name,
            collection_name: self.collection_name,
            track_id: self.track_id,
            artist_id: self.artist_id,
            collection_id: self.collection_id,
            genre: self.primary_genre_name,
            year,
            language: self.country,
        })
    }
}

#[async_trait]
impl MetadataProvider for ItunesMetadataProvider {
    async fn search(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MetadataCandidate>, ProviderError> {
        let mut term = format!("{} {}", artist, title);
        if let Some(album) = album {
            term.push(' ');
            term.push_str(album);
        }
        let url = format!(
            "{}/search?term={}&media=music&entity=song&limit={}",
            self.base_url,
            urlencoding::encode(&term),
            limit
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Unavailable(e.to_string())
            } else {
                ProviderError::Failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ProviderError::Failed(format!(
                "metadata search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?;

        Ok(body
            .results
            .into_iter()
            .filter_map(SearchResult::into_candidate)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_maps_year_from_release_date() {
        let result = SearchResult {
            track_name: Some("Bohemian Rhapsody".into()),
            artist_name: Some("Queen".into()),
            collection_name: Some("A Night at the Opera".into()),
            track_id: Some(1440806041),
            artist_id: Some(3296287),
            collection_id: Some(1440806023),
            primary_genre_name: Some("Rock".into()),
            release_date: Some("1975-10-31T08:00:00Z".into()),
            country: Some("USA".into()),
        };
        let candidate = result.into_candidate().unwrap();
        assert_eq!(candidate.year, Some(1975));
        assert_eq!(candidate.genre.as_deref(), Some("Rock"));
    }

    #[test]
    fn result_without_names_is_skipped() {
        let result = SearchResult {
            track_name: None,
            artist_name: Some("Queen".into()),
            collection_name: None,
            track_id: None,
            artist_id: None,
            collection_id: None,
            primary_genre_name: None,
            release_date: None,
            country: None,
        };
        assert!(result.into_candidate().is_none());
    }
}
