//! The public service façade.
//!
//! Every externally triggered state change flows through here: song
//! creation, job enqueueing (strictly after the song row exists),
//! cancellation, karaoke queue operations and performance controls. Events
//! are published only after the corresponding database commit, so push
//! snapshots and the event stream never disagree.

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::models::{
    CreateSongRequest, Job, JobKind, JobNotes, PerformanceControlPatch, PerformanceState,
    QueueEntry, Song, SongSource,
};
use crate::search;
use crate::services::job_store::JobStore;
use crate::services::performance::PerformanceStateHandle;
use crate::services::queue_store::QueueStore;
use crate::services::song_store::SongStore;

pub struct Coordinator {
    songs: Arc<SongStore>,
    jobs: Arc<JobStore>,
    queue: Arc<QueueStore>,
    performance: Arc<PerformanceStateHandle>,
    bus: EventBus,
    config: AppConfig,
}

impl Coordinator {
    pub fn new(
        songs: Arc<SongStore>,
        jobs: Arc<JobStore>,
        queue: Arc<QueueStore>,
        performance: Arc<PerformanceStateHandle>,
        bus: EventBus,
        config: AppConfig,
    ) -> Self {
        Self {
            songs,
            jobs,
            queue,
            performance,
            bus,
            config,
        }
    }

    /// Create a song row. For youtube sources the canonical identifier is
    /// the video id (extracted from `sourceUrl` when only that was sent);
    /// creating a duplicate returns the existing row instead of failing.
    pub async fn create_song(&self, request: &CreateSongRequest) -> Result<Song> {
        request.validate()?;

        let video_id = match request.source {
            SongSource::Youtube => {
                let raw = request
                    .video_id
                    .as_deref()
                    .or(request.source_url.as_deref())
                    .ok_or_else(|| AppError::missing("videoId"))?;
                Some(search::extract_video_id(raw).ok_or_else(|| {
                    AppError::invalid("videoId", "not a recognizable YouTube video id or URL")
                })?)
            }
            SongSource::Upload => None,
        };

        if let Some(video_id) = video_id.as_deref() {
            if let Some(existing) = self.songs.find_by_video_id(video_id).await? {
                tracing::info!(song_id = %existing.id, video_id, "create deduplicated");
                return Ok(existing);
            }
        }

        let song = self
            .songs
            .create_song(
                &request.title,
                &request.artist,
                request.album.as_deref(),
                request.source,
                request.source_url.as_deref(),
                video_id.as_deref(),
            )
            .await;

        match song {
            Ok(song) => {
                tracing::info!(song_id = %song.id, title = %song.title, "song created");
                Ok(song)
            }
            // Lost a creation race on the same video id: hand back the winner.
            Err(AppError::Conflict { message }) => {
                if let Some(vid) = video_id.as_deref() {
                    if let Some(existing) = self.songs.find_by_video_id(vid).await? {
                        return Ok(existing);
                    }
                }
                Err(AppError::Conflict { message })
            }
            Err(other) => Err(other),
        }
    }

    /// Enqueue the YouTube ingest pipeline for an existing song. The song
    /// row must already be readable; a missing song is a validation-level
    /// failure and writes no job row.
    pub async fn enqueue_youtube_job(&self, song_id: Uuid, video_or_url: &str) -> Result<Job> {
        let video_id = search::extract_video_id(video_or_url).ok_or_else(|| {
            AppError::invalid("videoId", "not a recognizable YouTube video id or URL")
        })?;

        let notes = JobNotes::Youtube {
            video_id,
            source_url: Some(video_or_url.to_string()),
        };
        let job = self.jobs.save_job(song_id, JobKind::Youtube, &notes).await?;

        self.bus.publish(Event::JobCreated(job.clone()));
        Ok(job)
    }

    /// Enqueue the upload pipeline: the audio file is already on disk at
    /// `source_path` by the time the job is created.
    pub async fn enqueue_upload_job(&self, song_id: Uuid, source_path: &str) -> Result<Job> {
        if source_path.trim().is_empty() {
            return Err(AppError::missing("filePath"));
        }
        let notes = JobNotes::Upload {
            source_path: source_path.to_string(),
        };
        let job = self.jobs.save_job(song_id, JobKind::Upload, &notes).await?;

        self.bus.publish(Event::JobCreated(job.clone()));
        Ok(job)
    }

    /// Request cooperative cancellation. Cancelling an already-terminal job
    /// is a no-op that reports the job as it stands.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<Job> {
        match self.jobs.request_cancel(job_id).await? {
            Some(job) => {
                // A pending job dies right here; running jobs publish their
                // cancelled event from the worker that observes the flag.
                if job.status() == crate::models::JobStatus::Cancelled {
                    self.bus.publish(Event::JobCancelled(job.clone()));
                }
                Ok(job)
            }
            None => self.jobs.get_job(job_id).await,
        }
    }

    /// Add a singer to the karaoke queue at the next free position.
    pub async fn add_to_queue(&self, song_id: Uuid, singer_name: &str) -> Result<QueueEntry> {
        if singer_name.trim().is_empty() {
            return Err(AppError::missing("singerName"));
        }
        let entry = self.queue.insert(song_id, singer_name.trim()).await?;
        self.bus
            .publish(Event::QueueChanged(self.queue.list().await?));
        Ok(entry)
    }

    pub async fn remove_queue_entry(&self, entry_id: i64) -> Result<()> {
        self.queue.remove(entry_id).await?;
        self.bus
            .publish(Event::QueueChanged(self.queue.list().await?));
        Ok(())
    }

    /// Atomically rewrite the queue order. The submitted sequence must be a
    /// permutation of the currently queued entries.
    pub async fn reorder_queue(&self, order: &[i64]) -> Result<Vec<QueueEntry>> {
        let entries = self.queue.reorder(order).await?;
        self.bus.publish(Event::QueueChanged(entries.clone()));
        Ok(entries)
    }

    /// Mark the current performance played and promote the head of the
    /// queue.
    pub async fn advance_queue(&self) -> Result<Option<QueueEntry>> {
        let now_playing = self.queue.advance().await?;
        let state = self
            .performance
            .set_current_entry(now_playing.as_ref().map(|e| e.id))
            .await;

        self.bus.publish(Event::QueueAdvanced {
            now_playing: now_playing.clone(),
        });
        self.bus.publish(Event::PerformanceChanged {
            patch: PerformanceControlPatch::default(),
            state,
        });
        Ok(now_playing)
    }

    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        self.queue.list().await
    }

    /// Apply a performance-control patch and broadcast the authoritative
    /// result to every performance client, the sender included.
    pub async fn update_performance_control(
        &self,
        patch: &PerformanceControlPatch,
    ) -> Result<PerformanceState> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(self.performance.snapshot().await);
        }
        let state = self.performance.apply(patch).await;
        self.bus.publish(Event::PerformanceChanged {
            patch: patch.clone(),
            state: state.clone(),
        });
        Ok(state)
    }

    pub async fn playback_play(&self) -> Result<PerformanceState> {
        let state = self.performance.set_playing(true).await;
        self.bus.publish(Event::PlaybackPlay);
        Ok(state)
    }

    pub async fn playback_pause(&self) -> Result<PerformanceState> {
        let state = self.performance.set_playing(false).await;
        self.bus.publish(Event::PlaybackPause);
        Ok(state)
    }

    pub async fn playback_seek(&self, position_ms: i64) -> Result<PerformanceState> {
        if position_ms < 0 {
            return Err(AppError::invalid("positionMs", "must be non-negative"));
        }
        let state = self.performance.snapshot().await;
        self.bus.publish(Event::PlaybackSeek { position_ms });
        Ok(state)
    }

    pub async fn performance_state(&self) -> PerformanceState {
        self.performance.snapshot().await
    }

    /// Delete a song and its on-disk directory. Refused while a job is
    /// active on it.
    pub async fn delete_song(&self, song_id: Uuid) -> Result<()> {
        self.songs.delete_song(song_id).await?;

        let dir = crate::services::media::song_dir(&self.config.storage.library_dir, song_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(song_id = %song_id, error = %e, "failed to remove song directory");
            }
        }
        Ok(())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}
