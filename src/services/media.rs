//! Command-runner adapters for the media downloader and the separation
//! engine. Both tools are external programs; these adapters only build the
//! command line, supervise the child, and map exit conditions onto the
//! provider error kinds.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::providers::{
    CancelSignal, FetchError, FetchedMedia, Fetcher, SeparatedStems, Separator, SeparatorError,
};

pub const ORIGINAL_FILE: &str = "original.mp3";
pub const VOCALS_FILE: &str = "vocals.mp3";
pub const INSTRUMENTAL_FILE: &str = "instrumental.mp3";

/// Runs the configured downloader command (yt-dlp by default) to produce
/// `original.mp3` in the song directory.
pub struct CommandFetcher {
    command: String,
}

impl CommandFetcher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn fetch(
        &self,
        video_id: &str,
        dest_dir: &Path,
        mut cancel: CancelSignal,
    ) -> Result<FetchedMedia, FetchError> {
        let target = dest_dir.join(ORIGINAL_FILE);
        if target.exists() {
            tracing::info!(?target, "original already present, skipping download");
            return Ok(FetchedMedia {
                original: target,
                duration_ms: None,
            });
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| FetchError::Network(format!("cannot create song dir: {}", e)))?;

        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let mut child = Command::new(&self.command)
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--output")
            .arg(&target)
            .arg(&url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Network(format!("cannot spawn {}: {}", self.command, e)))?;

        let stderr = child.stderr.take();
        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| FetchError::Network(e.to_string()))?
            }
            _ = cancel.changed() => {
                let _ = child.kill().await;
                return Err(FetchError::Cancelled);
            }
        };

        if !status.success() {
            let detail = read_stderr(stderr).await;
            return Err(classify_fetch_failure(&detail));
        }
        if !target.exists() {
            return Err(FetchError::Format(
                "downloader exited successfully but produced no audio".to_string(),
            ));
        }

        Ok(FetchedMedia {
            original: target,
            duration_ms: None,
        })
    }
}

fn classify_fetch_failure(detail: &str) -> FetchError {
    let lowered = detail.to_lowercase();
    if lowered.contains("unavailable")
        || lowered.contains("private")
        || lowered.contains("removed")
        || lowered.contains("not available")
    {
        FetchError::Unavailable(truncate(detail))
    } else if lowered.contains("format") || lowered.contains("unsupported") {
        FetchError::Format(truncate(detail))
    } else {
        FetchError::Network(truncate(detail))
    }
}

/// Runs the configured separation command to produce vocal and instrumental
/// stems next to the original.
pub struct CommandSeparator {
    command: String,
    device: String,
}

impl CommandSeparator {
    pub fn new(command: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            device: device.into(),
        }
    }
}

#[async_trait]
impl Separator for CommandSeparator {
    async fn separate(
        &self,
        original: &Path,
        dest_dir: &Path,
        mut cancel: CancelSignal,
    ) -> Result<SeparatedStems, SeparatorError> {
        let vocals = dest_dir.join(VOCALS_FILE);
        let instrumental = dest_dir.join(INSTRUMENTAL_FILE);
        if vocals.exists() && instrumental.exists() {
            tracing::info!(?dest_dir, "stems already present, skipping separation");
            return Ok(SeparatedStems {
                vocals,
                instrumental,
            });
        }

        let mut child = Command::new(&self.command)
            .arg("--device")
            .arg(&self.device)
            .arg("--input")
            .arg(original)
            .arg("--vocals")
            .arg(&vocals)
            .arg("--instrumental")
            .arg(&instrumental)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SeparatorError::Unavailable(format!("cannot spawn {}: {}", self.command, e))
            })?;

        let stderr = child.stderr.take();
        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| SeparatorError::Failed(e.to_string()))?
            }
            _ = cancel.changed() => {
                let _ = child.kill().await;
                return Err(SeparatorError::Cancelled);
            }
        };

        if !status.success() {
            let detail = read_stderr(stderr).await;
            return Err(SeparatorError::Failed(truncate(&detail)));
        }
        if !vocals.exists() || !instrumental.exists() {
            return Err(SeparatorError::Failed(
                "separator exited successfully but stems are missing".to_string(),
            ));
        }

        Ok(SeparatedStems {
            vocals,
            instrumental,
        })
    }
}

async fn read_stderr(stderr: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut buf = String::new();
    let _ = stderr.read_to_string(&mut buf).await;
    buf
}

fn truncate(detail: &str) -> String {
    const MAX: usize = 512;
    let trimmed = detail.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

/// Paths of a song's directory under the library root.
pub fn song_dir(library_dir: &Path, song_id: uuid::Uuid) -> PathBuf {
    library_dir.join(song_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_classify_by_message() {
        assert!(matches!(
            classify_fetch_failure("ERROR: Video unavailable"),
            FetchError::Unavailable(_)
        ));
        assert!(matches!(
            classify_fetch_failure("requested format is not available"),
            FetchError::Unavailable(_)
        ));
        assert!(matches!(
            classify_fetch_failure("no suitable format found"),
            FetchError::Format(_)
        ));
        assert!(matches!(
            classify_fetch_failure("connection reset by peer"),
            FetchError::Network(_)
        ));
    }
}
