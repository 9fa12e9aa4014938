//! Artist view derived from the songs table.

use serde::Serialize;

/// Derived artist summary. There is no artist table; this view is produced by
/// grouping songs on their normalized artist name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub name: String,
    pub first_letter: String,
    pub song_count: i64,
}
