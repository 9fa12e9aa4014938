//! LRC (synced lyrics) parsing and validation.
//!
//! A synced lyrics document is a sequence of `[mm:ss.xx]line` entries. One
//! physical line may carry several timestamps. Parsed entries are returned
//! sorted; storing a document whose timestamps decrease is rejected upstream.

use regex::Regex;
use std::sync::OnceLock;

/// One synced lyric line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LrcLine {
    pub timestamp_ms: u64,
    pub text: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LrcError {
    #[error("no timestamped lines found")]
    Empty,
    #[error("timestamps decrease at {0} ms")]
    NonMonotonic(u64),
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,3}):(\d{2})(?:[.:](\d{1,3}))?\]").expect("lrc pattern"))
}

/// Parse an LRC document into timestamped lines, sorted by timestamp.
///
/// Metadata tags (`[ar:...]`, `[ti:...]` etc.) and untagged lines are
/// ignored. Returns an error when nothing parseable remains or the document's
/// own ordering decreases.
pub fn parse(document: &str) -> Result<Vec<LrcLine>, LrcError> {
    let re = timestamp_regex();
    let mut lines = Vec::new();
    let mut last_seen: Option<u64> = None;
    let mut in_order = true;

    for raw in document.lines() {
        let mut stamp_end = 0usize;
        let mut stamps = Vec::new();
        for caps in re.captures_iter(raw) {
            let whole = caps.get(0).expect("match");
            // Timestamps must prefix the line; a stamp later in the text is
            // lyric content, not timing.
            if whole.start() != stamp_end {
                break;
            }
            stamp_end = whole.end();

            let minutes: u64 = caps[1].parse().unwrap_or(0);
            let seconds: u64 = caps[2].parse().unwrap_or(0);
            let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("0");
            let millis = match fraction.len() {
                0 => 0,
                1 => fraction.parse::<u64>().unwrap_or(0) * 100,
                2 => fraction.parse::<u64>().unwrap_or(0) * 10,
                _ => fraction[..3].parse::<u64>().unwrap_or(0),
            };
            stamps.push(minutes * 60_000 + seconds * 1_000 + millis);
        }

        if stamps.is_empty() {
            continue;
        }
        let text = raw[stamp_end..].trim().to_string();
        for ts in stamps {
            if let Some(prev) = last_seen {
                if ts < prev {
                    in_order = false;
                }
            }
            last_seen = Some(ts);
            lines.push(LrcLine {
                timestamp_ms: ts,
                text: text.clone(),
            });
        }
    }

    if lines.is_empty() {
        return Err(LrcError::Empty);
    }
    if !in_order {
        let first_bad = lines
            .windows(2)
            .find(|w| w[1].timestamp_ms < w[0].timestamp_ms)
            .map(|w| w[1].timestamp_ms)
            .unwrap_or(0);
        return Err(LrcError::NonMonotonic(first_bad));
    }

    lines.sort_by_key(|l| l.timestamp_ms);
    Ok(lines)
}

/// True when `document` parses as LRC with non-decreasing timestamps.
pub fn is_valid(document: &str) -> bool {
    parse(document).is_ok()
}

/// Timestamp of the last line, used to compare a synced variant's length
/// against the song duration.
pub fn duration_hint_ms(document: &str) -> Option<u64> {
    parse(document).ok().and_then(|lines| lines.last().map(|l| l.timestamp_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[ar:Queen]\n[00:01.00]Is this the real life\n[00:04.50]Is this just fantasy\n[01:10]Caught in a landslide\n";

    #[test]
    fn parses_basic_document() {
        let lines = parse(SAMPLE).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].timestamp_ms, 1_000);
        assert_eq!(lines[1].timestamp_ms, 4_500);
        assert_eq!(lines[2].timestamp_ms, 70_000);
        assert_eq!(lines[0].text, "Is this the real life");
    }

    #[test]
    fn multiple_stamps_share_a_line() {
        let doc = "[00:05.00][00:15.00]Chorus line\n";
        let lines = parse(doc).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.text == "Chorus line"));
    }

    #[test]
    fn rejects_decreasing_timestamps() {
        let doc = "[00:30.00]Later\n[00:10.00]Earlier\n";
        assert_eq!(parse(doc), Err(LrcError::NonMonotonic(10_000)));
        assert!(!is_valid(doc));
    }

    #[test]
    fn rejects_plain_text() {
        assert_eq!(parse("just some text\nwithout stamps"), Err(LrcError::Empty));
    }

    #[test]
    fn duration_hint_is_last_timestamp() {
        assert_eq!(duration_hint_ms(SAMPLE), Some(70_000));
    }
}
