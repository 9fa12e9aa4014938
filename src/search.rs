//! Text normalization and fuzzy matching for library search.
//!
//! Search matches query tokens against title/artist/album with
//! case-insensitive substring containment plus typo tolerance (edit distance
//! up to 2 for tokens of length >= 4). Ranking is deterministic so the same
//! query against an unchanged store serializes identically.

use levenshtein::levenshtein;
use regex::Regex;
use std::sync::OnceLock;

/// Normalize an artist or title for comparison: trim, casefold, collapse
/// inner whitespace.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Sort key for artist listings. A leading "The " does not affect ordering.
pub fn artist_sort_key(name: &str) -> String {
    let normalized = normalize(name);
    normalized
        .strip_prefix("the ")
        .map(|rest| rest.to_string())
        .unwrap_or(normalized)
}

/// Grouping letter for an artist: first alphabetic letter uppercased, or `#`
/// for names that sort under digits/symbols.
pub fn artist_first_letter(name: &str) -> String {
    match artist_sort_key(name).chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase().to_string(),
        Some(c) if c.is_alphabetic() => c.to_uppercase().to_string(),
        _ => "#".to_string(),
    }
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// How well one query token matches one field token.
fn token_score(query: &str, field: &str) -> u32 {
    if field == query {
        return 100;
    }
    if field.contains(query) || query.contains(field) {
        return 60;
    }
    if query.len() >= 4 && field.len() >= 4 {
        let distance = levenshtein(query, field);
        match distance {
            1 => 40,
            2 => 20,
            _ => 0,
        }
    } else {
        0
    }
}

/// Relevance of a query against one field. Every query token must find some
/// match in at least one field for the song to be relevant at all; this
/// function only reports the per-field contribution.
fn field_score(query_tokens: &[String], field: &str) -> u32 {
    let field_tokens = tokens(field);
    query_tokens
        .iter()
        .map(|q| {
            field_tokens
                .iter()
                .map(|f| token_score(q, f))
                .max()
                .unwrap_or(0)
        })
        .sum()
}

/// Relevance of a search query against a song's title/artist/album.
/// Returns `None` when some query token matches nothing anywhere.
pub fn relevance(query: &str, title: &str, artist: &str, album: Option<&str>) -> Option<u32> {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return None;
    }

    let title_tokens = tokens(title);
    let artist_tokens = tokens(artist);
    let album_tokens = album.map(tokens).unwrap_or_default();

    for q in &query_tokens {
        let matched = title_tokens
            .iter()
            .chain(artist_tokens.iter())
            .chain(album_tokens.iter())
            .any(|f| token_score(q, f) > 0);
        if !matched {
            return None;
        }
    }

    // Title matches outrank artist matches outrank album matches.
    let score = field_score(&query_tokens, title) * 3
        + field_score(&query_tokens, artist) * 2
        + album.map(|a| field_score(&query_tokens, a)).unwrap_or(0);
    Some(score)
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?: youtu\.be/
              | youtube\.com/ (?: watch\?(?:[^\#]*&)?v= | embed/ | shorts/ | live/ )
            )
            ([A-Za-z0-9_-]{11})",
        )
        .expect("video id pattern")
    })
}

/// Extract the canonical 11-character YouTube video id from a watch, share,
/// embed or shorts URL. Bare ids pass through unchanged.
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.len() == 11 && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Some(trimmed.to_string());
    }
    video_id_regex()
        .captures(trimmed)
        .map(|caps| caps[1].to_string())
}
