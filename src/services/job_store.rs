//! Job persistence and the job state machine.
//!
//! The store is the gatekeeper for every transition: jobs are created only
//! for songs that already exist, a pending job is handed to exactly one
//! worker via an atomic reservation, and only the reserving worker (proved
//! by its `task_ref`) can move the job forward. Stale or out-of-order writes
//! are ignored rather than failed, so a recovered worker can never corrupt a
//! job another worker picked up.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Job, JobErrorKind, JobKind, JobNotes, JobPatch, JobStatus, JobStatusSummary};

pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending job. The referenced song must already exist (jobs
    /// are enqueued strictly after their song row is visible), and the
    /// written row is read back before returning; a row that cannot be read
    /// back is a fail-stop persistence error.
    pub async fn save_job(&self, song_id: Uuid, kind: JobKind, notes: &JobNotes) -> Result<Job> {
        let song_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM songs WHERE id = ?")
            .bind(song_id)
            .fetch_one(&self.pool)
            .await?;
        if song_exists == 0 {
            return Err(AppError::not_found("Song"));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO jobs (id, song_id, kind, status, progress, notes, created_at)
               VALUES (?, ?, ?, 'pending', 0, ?, ?)"#,
        )
        .bind(id)
        .bind(song_id)
        .bind(kind.as_str())
        .bind(serde_json::to_string(notes)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::Persistence {
                message: format!("job {} written but not readable", id),
            })?;

        tracing::info!(job_id = %job.id, song_id = %song_id, kind = kind.as_str(), "job saved");
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Job"))
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(
            sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Jobs shown in a fresh `/jobs` snapshot: everything non-terminal plus
    /// terminal jobs younger than the retention window.
    pub async fn snapshot_jobs(&self, retention: Duration) -> Result<Vec<Job>> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::hours(24));
        Ok(sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs
               WHERE status NOT IN ('completed', 'failed', 'cancelled')
                  OR ended_at > ?
               ORDER BY created_at DESC"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Atomically claim the oldest pending job: assign a fresh task ref and
    /// move it to `reserved`. Safe under concurrent callers; at most one
    /// worker sees any given job. Progress restarts at 0, so a re-reserved job
    /// resumes from the entry value of its first incomplete step.
    pub async fn reserve_next_runnable(&self) -> Result<Option<Job>> {
        let task_ref = Uuid::new_v4();
        let now = Utc::now();
        let job = sqlx::query_as::<_, Job>(
            r#"UPDATE jobs
               SET status = 'reserved', task_ref = ?, reserved_at = ?, started_at = ?,
                   progress = 0, status_message = NULL
               WHERE id = (SELECT id FROM jobs WHERE status = 'pending'
                           ORDER BY created_at LIMIT 1)
               RETURNING *"#,
        )
        .bind(task_ref)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(job) = &job {
            tracing::info!(job_id = %job.id, task_ref = %task_ref, "job reserved");
        }
        Ok(job)
    }

    /// Apply a worker's patch. The patch is dropped (Ok, with a log line)
    /// when the task ref no longer matches, the transition is backwards, or
    /// the progress value would decrease.
    pub async fn update_job(&self, id: Uuid, task_ref: Uuid, patch: &JobPatch) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Job"))?;

        if current.task_ref != Some(task_ref) {
            tracing::warn!(job_id = %id, "update from stale reservation ignored");
            return Ok(None);
        }

        let status = match patch.status {
            Some(next) if !current.status().allows(next) => {
                tracing::warn!(
                    job_id = %id,
                    from = current.status().as_str(),
                    to = next.as_str(),
                    "out-of-order status update ignored"
                );
                return Ok(None);
            }
            Some(next) => next,
            None => current.status(),
        };

        let progress = match patch.progress {
            Some(p) if p < current.progress => {
                tracing::warn!(job_id = %id, from = current.progress, to = p,
                    "non-monotonic progress update ignored");
                current.progress
            }
            Some(p) => p.min(100),
            None => current.progress,
        };

        let status_message = patch
            .status_message
            .clone()
            .or(current.status_message.clone());
        let started_at = patch.started_at.or(current.started_at);

        sqlx::query(
            r#"UPDATE jobs SET status = ?, progress = ?, status_message = ?, started_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(progress)
        .bind(&status_message)
        .bind(started_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(self.get_job(id).await?))
    }

    /// Move a job to a terminal state. Only the reserving worker may do so;
    /// completion forces progress to 100 and stamps `ended_at`.
    pub async fn mark_terminal(
        &self,
        id: Uuid,
        task_ref: Uuid,
        status: JobStatus,
        error: Option<(JobErrorKind, serde_json::Value)>,
        message: Option<&str>,
    ) -> Result<Option<Job>> {
        debug_assert!(status.is_terminal());
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Job"))?;

        if current.task_ref != Some(task_ref) || current.is_terminal() {
            return Ok(None);
        }
        // A pending cancellation can only resolve to `cancelled`.
        if current.status() == JobStatus::Cancelling && status != JobStatus::Cancelled {
            return Ok(None);
        }

        let progress = if status == JobStatus::Completed {
            100
        } else {
            current.progress
        };
        let (error_kind, error_detail) = match &error {
            Some((kind, detail)) => (Some(kind.as_str()), Some(serde_json::to_string(detail)?)),
            None => (None, None),
        };

        sqlx::query(
            r#"UPDATE jobs SET status = ?, progress = ?, status_message = ?,
               error_kind = ?, error_detail = ?, ended_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(progress)
        .bind(message)
        .bind(error_kind)
        .bind(error_detail)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(job_id = %id, status = status.as_str(), "job reached terminal state");
        Ok(Some(self.get_job(id).await?))
    }

    /// Flag a job for cooperative cancellation. A still-pending job is
    /// cancelled outright; a running one is marked `cancelling` for its
    /// worker to observe. Terminal jobs are a no-op.
    ///
    /// Returns the job when a state changed, `None` for the terminal no-op.
    pub async fn request_cancel(&self, id: Uuid) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Job"))?;

        if current.is_terminal() {
            return Ok(None);
        }

        if current.status() == JobStatus::Pending {
            sqlx::query(
                r#"UPDATE jobs SET status = 'cancelled', ended_at = ? WHERE id = ?"#,
            )
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        } else if current.status() != JobStatus::Cancelling {
            sqlx::query("UPDATE jobs SET status = 'cancelling' WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(Some(self.get_job(id).await?))
    }

    /// Whether cancellation has been requested for a job. Polled by workers
    /// between steps and at safe points inside long steps.
    pub async fn cancel_requested(&self, id: Uuid) -> Result<bool> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(matches!(
            status.as_deref().and_then(JobStatus::parse),
            Some(JobStatus::Cancelling) | Some(JobStatus::Cancelled)
        ))
    }

    /// Delete a terminal job before the reaper would. Dismissing a live job
    /// is refused.
    pub async fn dismiss_job(&self, id: Uuid) -> Result<()> {
        let job = self.get_job(id).await?;
        if !job.is_terminal() {
            return Err(AppError::OperationNotAllowed {
                reason: "only terminal jobs can be dismissed".to_string(),
            });
        }
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reopen reservations whose worker disappeared: anything still sitting
    /// in `reserved` longer than `stale_after` goes back to `pending` for
    /// any worker to pick up again.
    pub async fn reopen_stale_reservations(&self, stale_after: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(stale_after).unwrap_or_else(|_| ChronoDuration::seconds(60));
        let reopened = sqlx::query(
            r#"UPDATE jobs
               SET status = 'pending', task_ref = NULL, reserved_at = NULL
               WHERE status = 'reserved' AND reserved_at < ?"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reopened > 0 {
            tracing::warn!(reopened, "reopened stale reservations");
        }
        Ok(reopened)
    }

    /// Startup recovery: every job a previous process left mid-flight goes
    /// back to `pending`; a pending cancellation is honored immediately.
    /// Pipelines are resumable, so re-running from the first incomplete step
    /// is safe.
    pub async fn recover_orphaned_jobs(&self) -> Result<u64> {
        let cancelled = sqlx::query(
            r#"UPDATE jobs SET status = 'cancelled', ended_at = ?
               WHERE status = 'cancelling'"#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let reopened = sqlx::query(
            r#"UPDATE jobs SET status = 'pending', task_ref = NULL, reserved_at = NULL
               WHERE status IN ('reserved', 'downloading', 'processing')"#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reopened + cancelled > 0 {
            tracing::info!(reopened, cancelled, "recovered orphaned jobs at startup");
        }
        Ok(reopened)
    }

    /// Drop terminal jobs older than the retention window.
    pub async fn reap_terminal_jobs(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::hours(24));
        let reaped = sqlx::query(
            r#"DELETE FROM jobs
               WHERE status IN ('completed', 'failed', 'cancelled') AND ended_at < ?"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reaped > 0 {
            tracing::info!(reaped, "reaped terminal jobs");
        }
        Ok(reaped)
    }

    /// Counts for the status summary endpoint.
    pub async fn status_summary(&self) -> Result<JobStatusSummary> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = JobStatusSummary {
            pending: 0,
            active: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            queue_depth: 0,
        };
        for (status, count) in rows {
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => summary.pending += count,
                Some(JobStatus::Reserved)
                | Some(JobStatus::Downloading)
                | Some(JobStatus::Processing)
                | Some(JobStatus::Cancelling) => summary.active += count,
                Some(JobStatus::Completed) => summary.completed += count,
                Some(JobStatus::Failed) => summary.failed += count,
                Some(JobStatus::Cancelled) => summary.cancelled += count,
                None => {}
            }
        }
        summary.queue_depth = summary.pending;
        Ok(summary)
    }
}
