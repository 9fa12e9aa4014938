//! Karaoke queue persistence.
//!
//! Invariants enforced here: queued positions are exactly `1..k` with no
//! gaps, and at most one entry is `playing` at any instant. Every mutation
//! runs in one transaction so two racing requests serialize into one of the
//! two orders rather than a mix.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{QueueEntry, QueueEntryStatus};

pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All non-archived entries: the playing one first, then queued entries
    /// by position.
    pub async fn list(&self) -> Result<Vec<QueueEntry>> {
        Ok(sqlx::query_as::<_, QueueEntry>(
            r#"SELECT * FROM queue_entries
               WHERE status IN ('playing', 'queued')
               ORDER BY CASE status WHEN 'playing' THEN 0 ELSE 1 END, position"#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get(&self, id: i64) -> Result<QueueEntry> {
        sqlx::query_as::<_, QueueEntry>("SELECT * FROM queue_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Queue entry"))
    }

    /// Append a singer at the tail of the queue.
    pub async fn insert(&self, song_id: Uuid, singer_name: &str) -> Result<QueueEntry> {
        let mut tx = self.pool.begin().await?;

        let song_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM songs WHERE id = ?")
            .bind(song_id)
            .fetch_one(&mut *tx)
            .await?;
        if song_exists == 0 {
            return Err(AppError::not_found("Song"));
        }

        let next_position = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM queue_entries WHERE status = 'queued'",
        )
        .fetch_one(&mut *tx)
        .await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO queue_entries (song_id, singer_name, position, status, added_at)
               VALUES (?, ?, ?, 'queued', ?)
               RETURNING id"#,
        )
        .bind(song_id)
        .bind(singer_name)
        .bind(next_position)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get(id).await
    }

    /// Remove a queued entry and close the gap it leaves.
    pub async fn remove(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let entry = sqlx::query_as::<_, QueueEntry>("SELECT * FROM queue_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Queue entry"))?;

        sqlx::query("DELETE FROM queue_entries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if entry.status() == QueueEntryStatus::Queued {
            renumber_queued(&mut tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rewrite queued positions to match `order`, which must be a permutation
    /// of the currently queued entry ids.
    pub async fn reorder(&self, order: &[i64]) -> Result<Vec<QueueEntry>> {
        let mut tx = self.pool.begin().await?;

        let mut current: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM queue_entries WHERE status = 'queued' ORDER BY position",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut requested = order.to_vec();
        requested.sort_unstable();
        current.sort_unstable();
        if requested != current {
            return Err(AppError::Conflict {
                message: "reorder list is not a permutation of the queued entries".to_string(),
            });
        }

        // Clear first: the partial unique index on position would otherwise
        // reject transient collisions mid-rewrite.
        sqlx::query("UPDATE queue_entries SET position = NULL WHERE status = 'queued'")
            .execute(&mut *tx)
            .await?;
        for (index, id) in order.iter().enumerate() {
            sqlx::query("UPDATE queue_entries SET position = ? WHERE id = ?")
                .bind((index + 1) as i64)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.list().await
    }

    /// Archive the current playing entry (if any) and promote the head of
    /// the queue. Returns the entry now playing.
    pub async fn advance(&self) -> Result<Option<QueueEntry>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"UPDATE queue_entries SET status = 'played', played_at = ?, position = NULL
               WHERE status = 'playing'"#,
        )
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let head: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM queue_entries WHERE status = 'queued' AND position = 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let now_playing = match head {
            Some(id) => {
                sqlx::query(
                    "UPDATE queue_entries SET status = 'playing', position = NULL WHERE id = ?",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                renumber_queued(&mut tx).await?;
                Some(id)
            }
            None => None,
        };

        tx.commit().await?;

        match now_playing {
            Some(id) => Ok(Some(self.get(id).await?)),
            None => Ok(None),
        }
    }

    /// Drop `played` entries older than the retention window.
    pub async fn reap_played(&self, retention: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::hours(24));
        Ok(sqlx::query(
            "DELETE FROM queue_entries WHERE status = 'played' AND played_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected())
    }
}

/// Rewrite queued positions to a contiguous 1..k, preserving relative order.
/// Clears them first: the partial unique index rejects transient collisions
/// that an in-place `position - 1` sweep can hit mid-statement.
async fn renumber_queued(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM queue_entries WHERE status = 'queued' ORDER BY position",
    )
    .fetch_all(&mut **tx)
    .await?;

    sqlx::query("UPDATE queue_entries SET position = NULL WHERE status = 'queued'")
        .execute(&mut **tx)
        .await?;
    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE queue_entries SET position = ? WHERE id = ?")
            .bind((index + 1) as i64)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
