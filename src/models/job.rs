//! Job rows, state machine, and wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Upload,
    Youtube,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Upload => "upload",
            JobKind::Youtube => "youtube",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upload" => Some(JobKind::Upload),
            "youtube" => Some(JobKind::Youtube),
            _ => None,
        }
    }
}

/// Job lifecycle. Observed sequences are prefixes of
/// `pending → reserved → downloading → processing → completed`, or end at
/// `failed`/`cancelled`; `cancelling` marks a cancellation that the owning
/// worker has not yet observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Reserved,
    Downloading,
    Processing,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Reserved => "reserved",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobStatus::Pending),
            "reserved" => Some(JobStatus::Reserved),
            "downloading" => Some(JobStatus::Downloading),
            "processing" => Some(JobStatus::Processing),
            "cancelling" => Some(JobStatus::Cancelling),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Rank used to refuse backwards transitions. `cancelling` may interrupt
    /// any non-terminal state, and every non-terminal state may reach a
    /// terminal one, so those edges are checked separately.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Reserved => 1,
            JobStatus::Downloading => 2,
            JobStatus::Processing => 3,
            JobStatus::Cancelling => 4,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 5,
        }
    }

    /// Whether moving `self → next` follows the state machine. Re-entering the
    /// same state is an idempotent no-op and allowed. Reopening a stale
    /// reservation (`reserved/downloading/processing → pending`) is the one
    /// sanctioned backwards edge and is handled by the job store directly,
    /// not through this check.
    pub fn allows(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        if next == JobStatus::Cancelling {
            return true;
        }
        if self == &JobStatus::Cancelling {
            return next == JobStatus::Cancelled;
        }
        next.rank() > self.rank()
    }
}

/// Error kinds a failed job reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobErrorKind {
    FetchNetwork,
    FetchUnavailable,
    FetchFormat,
    SeparatorUnavailable,
    SeparatorFailed,
    Timeout,
    Persistence,
    Internal,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::FetchNetwork => "FetchNetwork",
            JobErrorKind::FetchUnavailable => "FetchUnavailable",
            JobErrorKind::FetchFormat => "FetchFormat",
            JobErrorKind::SeparatorUnavailable => "SeparatorUnavailable",
            JobErrorKind::SeparatorFailed => "SeparatorFailed",
            JobErrorKind::Timeout => "Timeout",
            JobErrorKind::Persistence => "Persistence",
            JobErrorKind::Internal => "Internal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "FetchNetwork" => Some(Self::FetchNetwork),
            "FetchUnavailable" => Some(Self::FetchUnavailable),
            "FetchFormat" => Some(Self::FetchFormat),
            "SeparatorUnavailable" => Some(Self::SeparatorUnavailable),
            "SeparatorFailed" => Some(Self::SeparatorFailed),
            "Timeout" => Some(Self::Timeout),
            "Persistence" => Some(Self::Persistence),
            "Internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Step-specific payload carried by a job. Tagged by the job's kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobNotes {
    Youtube {
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
    },
    Upload {
        source_path: String,
    },
}

impl JobNotes {
    pub fn video_id(&self) -> Option<&str> {
        match self {
            JobNotes::Youtube { video_id, .. } => Some(video_id),
            JobNotes::Upload { .. } => None,
        }
    }
}

/// A pipeline job.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub song_id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: KindColumn,
    #[sqlx(try_from = "String")]
    pub status: JobStatusColumn,
    pub progress: i64,
    pub status_message: Option<String>,
    /// Opaque reservation handle; null until a worker reserves the job.
    pub task_ref: Option<Uuid>,
    pub error_kind: Option<String>,
    #[sqlx(json(nullable))]
    pub error_detail: Option<serde_json::Value>,
    #[sqlx(json)]
    pub notes: JobNotes,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub reserved_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindColumn(pub JobKind);

impl TryFrom<String> for KindColumn {
    type Error = String;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        JobKind::parse(&raw)
            .map(KindColumn)
            .ok_or_else(|| format!("unknown job kind {:?}", raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatusColumn(pub JobStatus);

impl TryFrom<String> for JobStatusColumn {
    type Error = String;
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        JobStatus::parse(&raw)
            .map(JobStatusColumn)
            .ok_or_else(|| format!("unknown job status {:?}", raw))
    }
}

impl Job {
    pub fn kind(&self) -> JobKind {
        self.kind.0
    }

    pub fn status(&self) -> JobStatus {
        self.status.0
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Patch a worker applies to its reserved job. Only the reserving worker
/// (verified via `task_ref`) gets its patches applied.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub status_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Counts for `GET /jobs/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSummary {
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub queue_depth: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_forward_only() {
        assert!(JobStatus::Pending.allows(JobStatus::Reserved));
        assert!(JobStatus::Reserved.allows(JobStatus::Downloading));
        assert!(JobStatus::Downloading.allows(JobStatus::Processing));
        assert!(JobStatus::Processing.allows(JobStatus::Completed));
        assert!(!JobStatus::Processing.allows(JobStatus::Downloading));
        assert!(!JobStatus::Completed.allows(JobStatus::Failed));
    }

    #[test]
    fn cancelling_interrupts_any_active_state() {
        for status in [
            JobStatus::Pending,
            JobStatus::Reserved,
            JobStatus::Downloading,
            JobStatus::Processing,
        ] {
            assert!(status.allows(JobStatus::Cancelling), "{:?}", status);
        }
        assert!(JobStatus::Cancelling.allows(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelling.allows(JobStatus::Completed));
        assert!(!JobStatus::Completed.allows(JobStatus::Cancelling));
    }

    #[test]
    fn same_state_is_idempotent() {
        assert!(JobStatus::Processing.allows(JobStatus::Processing));
        assert!(!JobStatus::Completed.allows(JobStatus::Completed));
    }

    #[test]
    fn notes_tag_by_kind() {
        let notes = JobNotes::Youtube {
            video_id: "fJ9rUzIMcZQ".into(),
            source_url: None,
        };
        let value = serde_json::to_value(&notes).unwrap();
        assert_eq!(value["kind"], "youtube");
        assert_eq!(value["video_id"], "fJ9rUzIMcZQ");

        let upload: JobNotes =
            serde_json::from_value(serde_json::json!({"kind": "upload", "source_path": "/tmp/x.mp3"}))
                .unwrap();
        assert_eq!(
            upload,
            JobNotes::Upload {
                source_path: "/tmp/x.mp3".into()
            }
        );
    }
}
