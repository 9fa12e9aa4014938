//! The ingest pipelines.
//!
//! Both pipelines are sequences of idempotent steps: every step detects its
//! own outputs (via the song's path mapping and the lyrics row) and
//! short-circuits, so a crashed or reopened job re-enters at the first step
//! whose outputs are missing. Fetch and Separate failures are fatal to the
//! job; metadata and lyrics enrichment are best-effort.

use levenshtein::levenshtein;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::StepTimeouts;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::models::{
    ItunesIds, Job, JobErrorKind, JobKind, JobNotes, JobPatch, JobStatus, SetLyricsRequest,
    SongStatus, Thumbnail,
};
use crate::search;
use crate::services::job_store::JobStore;
use crate::services::media::{INSTRUMENTAL_FILE, ORIGINAL_FILE, VOCALS_FILE};
use crate::services::providers::{
    CancelSignal, FetchError, Fetcher, LyricsCandidate, LyricsProvider, MetadataCandidate,
    MetadataProvider, SeparatorError, Separator,
};
use crate::services::song_store::{MetadataUpdate, SongStore};

/// Everything a pipeline needs, constructed once at startup and handed to
/// the dispatcher.
pub struct PipelineContext {
    pub songs: Arc<SongStore>,
    pub jobs: Arc<JobStore>,
    pub bus: EventBus,
    pub fetcher: Arc<dyn Fetcher>,
    pub separator: Arc<dyn Separator>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub lyrics: Arc<dyn LyricsProvider>,
    pub library_dir: PathBuf,
    pub timeouts: StepTimeouts,
}

/// The steps, in execution order. Receive and Fetch fill the same band: one
/// produces the original from an uploaded file, the other from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Receive,
    Fetch,
    Separate,
    EnrichMetadata,
    EnrichLyrics,
    Finalize,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Receive => "receive",
            Step::Fetch => "fetch",
            Step::Separate => "separate",
            Step::EnrichMetadata => "metadata",
            Step::EnrichLyrics => "lyrics",
            Step::Finalize => "finalize",
        }
    }

    /// Progress value at which the step begins; a resumed pipeline restarts
    /// from the entry value of its first incomplete step.
    fn entry_progress(&self) -> i64 {
        match self {
            Step::Receive | Step::Fetch => 5,
            Step::Separate => 30,
            Step::EnrichMetadata => 90,
            Step::EnrichLyrics => 95,
            Step::Finalize => 98,
        }
    }

    /// Progress value the step reaches on success.
    fn exit_progress(&self) -> i64 {
        match self {
            Step::Receive | Step::Fetch => 30,
            Step::Separate => 90,
            Step::EnrichMetadata => 95,
            Step::EnrichLyrics => 98,
            Step::Finalize => 100,
        }
    }

    fn deadline(&self, timeouts: &StepTimeouts) -> Option<Duration> {
        match self {
            Step::Receive => None,
            Step::Fetch => Some(timeouts.fetch),
            Step::Separate => Some(timeouts.separate),
            Step::EnrichMetadata => Some(timeouts.metadata),
            Step::EnrichLyrics => Some(timeouts.lyrics),
            Step::Finalize => None,
        }
    }
}

fn steps_for(kind: JobKind) -> &'static [Step] {
    match kind {
        JobKind::Youtube => &[
            Step::Fetch,
            Step::Separate,
            Step::EnrichMetadata,
            Step::EnrichLyrics,
            Step::Finalize,
        ],
        JobKind::Upload => &[
            Step::Receive,
            Step::Separate,
            Step::EnrichMetadata,
            Step::EnrichLyrics,
            Step::Finalize,
        ],
    }
}

/// Why a pipeline stopped.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed,
    Failed {
        step: Step,
        kind: JobErrorKind,
        message: String,
    },
    Cancelled,
    /// The reservation was lost to recovery (stale-reopen) mid-run; another
    /// worker owns the job now and this one must not touch it again.
    ReservationLost,
}

enum StepError {
    Fatal { kind: JobErrorKind, message: String },
    Cancelled,
    ReservationLost,
}

/// What became of a job patch: applied, refused because a cancellation is
/// pending, or refused because another worker owns the job now.
enum PatchOutcome {
    Applied,
    Cancelling,
    Lost,
}

pub struct Pipeline<'a> {
    ctx: &'a PipelineContext,
    job: Job,
    task_ref: Uuid,
    cancel: CancelSignal,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a PipelineContext, job: Job, cancel: CancelSignal) -> Self {
        let task_ref = job.task_ref.expect("reserved job carries a task ref");
        Self {
            ctx,
            job,
            task_ref,
            cancel,
        }
    }

    /// Drive the job to a terminal state. All job/song writes commit before
    /// their events are published.
    pub async fn run(mut self) -> Result<PipelineOutcome> {
        let steps = steps_for(self.job.kind());

        for &step in steps {
            if self.ctx.jobs.cancel_requested(self.job.id).await? {
                return self.finish_cancelled().await;
            }

            if self.step_already_complete(step).await? {
                tracing::info!(job_id = %self.job.id, step = step.name(), "step outputs present, skipping");
                continue;
            }

            match self
                .patch_job(JobPatch {
                    progress: Some(step.entry_progress()),
                    status_message: Some(format!("running {}", step.name())),
                    ..JobPatch::default()
                })
                .await?
            {
                PatchOutcome::Applied => {}
                PatchOutcome::Cancelling => return self.finish_cancelled().await,
                PatchOutcome::Lost => return Ok(PipelineOutcome::ReservationLost),
            }

            let outcome = match step.deadline(&self.ctx.timeouts) {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, self.run_step(step)).await {
                        Ok(result) => result,
                        Err(_) => Err(StepError::Fatal {
                            kind: JobErrorKind::Timeout,
                            message: format!("{} exceeded {:?}", step.name(), deadline),
                        }),
                    }
                }
                None => self.run_step(step).await,
            };

            match outcome {
                Ok(()) => {
                    if step != Step::Finalize {
                        match self
                            .patch_job(JobPatch {
                                progress: Some(step.exit_progress()),
                                ..JobPatch::default()
                            })
                            .await?
                        {
                            PatchOutcome::Applied => {}
                            PatchOutcome::Cancelling => return self.finish_cancelled().await,
                            PatchOutcome::Lost => {
                                return Ok(PipelineOutcome::ReservationLost)
                            }
                        }
                    }
                }
                Err(StepError::Cancelled) => return self.finish_cancelled().await,
                Err(StepError::ReservationLost) => return Ok(PipelineOutcome::ReservationLost),
                Err(StepError::Fatal { kind, message }) => {
                    return self.finish_failed(step, kind, message).await;
                }
            }
        }

        Ok(PipelineOutcome::Completed)
    }

    /// Detect a step's outputs so re-entry can short-circuit.
    async fn step_already_complete(&mut self, step: Step) -> Result<bool> {
        let song = self.ctx.songs.get_song(self.job.song_id).await?;
        Ok(match step {
            Step::Receive | Step::Fetch => song.paths.original.is_some(),
            Step::Separate => song.paths.vocals.is_some() && song.paths.instrumental.is_some(),
            Step::EnrichMetadata => song.itunes_ids.is_some(),
            Step::EnrichLyrics => self.ctx.songs.get_lyrics(song.id).await.is_ok(),
            Step::Finalize => false,
        })
    }

    async fn run_step(&mut self, step: Step) -> std::result::Result<(), StepError> {
        match step {
            Step::Receive => self.step_receive().await,
            Step::Fetch => self.step_fetch().await,
            Step::Separate => self.step_separate().await,
            Step::EnrichMetadata => self.step_enrich_metadata().await,
            Step::EnrichLyrics => self.step_enrich_lyrics().await,
            Step::Finalize => self.step_finalize().await,
        }
    }

    /// Upload intake: the audio already sits at `notes.source_path`; put it
    /// in place as the song's original.
    async fn step_receive(&mut self) -> std::result::Result<(), StepError> {
        let JobNotes::Upload { source_path } = &self.job.notes else {
            return Err(StepError::Fatal {
                kind: JobErrorKind::Internal,
                message: "upload job without upload notes".to_string(),
            });
        };

        let dir = self.song_dir();
        let target = dir.join(ORIGINAL_FILE);
        if !target.exists() {
            tokio::fs::create_dir_all(&dir).await.map_err(internal)?;
            tokio::fs::copy(source_path, &target)
                .await
                .map_err(|e| StepError::Fatal {
                    kind: JobErrorKind::FetchFormat,
                    message: format!("uploaded file unreadable: {}", e),
                })?;
        }

        self.record_original().await
    }

    async fn step_fetch(&mut self) -> std::result::Result<(), StepError> {
        let Some(video_id) = self.job.notes.video_id().map(str::to_string) else {
            return Err(StepError::Fatal {
                kind: JobErrorKind::Internal,
                message: "youtube job without a video id".to_string(),
            });
        };

        self.set_song_status(SongStatus::Downloading).await?;
        self.patch_status(JobStatus::Downloading).await?;

        let dir = self.song_dir();
        let fetched = self
            .ctx
            .fetcher
            .fetch(&video_id, &dir, self.cancel.clone())
            .await
            .map_err(|e| match e {
                FetchError::Cancelled => StepError::Cancelled,
                FetchError::Network(m) => fatal(JobErrorKind::FetchNetwork, m),
                FetchError::Unavailable(m) => fatal(JobErrorKind::FetchUnavailable, m),
                FetchError::Format(m) => fatal(JobErrorKind::FetchFormat, m),
            })?;

        if let Some(duration_ms) = fetched.duration_ms {
            self.ctx
                .songs
                .set_duration(self.job.song_id, duration_ms)
                .await
                .map_err(app)?;
        }
        self.ctx
            .songs
            .set_thumbnails(self.job.song_id, &youtube_thumbnails(&video_id))
            .await
            .map_err(app)?;

        self.record_original().await?;
        self.set_song_status(SongStatus::Processing).await?;
        self.patch_status(JobStatus::Processing).await?;
        Ok(())
    }

    async fn step_separate(&mut self) -> std::result::Result<(), StepError> {
        self.set_song_status(SongStatus::Processing).await?;
        self.patch_status(JobStatus::Processing).await?;

        let dir = self.song_dir();
        let original = dir.join(ORIGINAL_FILE);
        let stems = self
            .ctx
            .separator
            .separate(&original, &dir, self.cancel.clone())
            .await
            .map_err(|e| match e {
                SeparatorError::Cancelled => StepError::Cancelled,
                SeparatorError::Unavailable(m) => fatal(JobErrorKind::SeparatorUnavailable, m),
                SeparatorError::Failed(m) => fatal(JobErrorKind::SeparatorFailed, m),
            })?;

        tracing::info!(
            job_id = %self.job.id,
            vocals = %stems.vocals.display(),
            instrumental = %stems.instrumental.display(),
            "separation complete"
        );
        self.ctx
            .songs
            .merge_paths(self.job.song_id, |paths| {
                paths.vocals = Some(VOCALS_FILE.to_string());
                paths.instrumental = Some(INSTRUMENTAL_FILE.to_string());
            })
            .await
            .map_err(app)?;
        Ok(())
    }

    /// Best-effort metadata enrichment. Failures log a warning and the
    /// pipeline moves on.
    async fn step_enrich_metadata(&mut self) -> std::result::Result<(), StepError> {
        let song = self.ctx.songs.get_song(self.job.song_id).await.map_err(app)?;

        let candidates = match self
            .ctx
            .metadata
            .search(&song.artist, &song.title, song.album.as_deref(), 10)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(job_id = %self.job.id, error = %e, "metadata enrichment failed");
                return Ok(());
            }
        };

        let Some(best) = select_best_candidate(&song.artist, &song.title, &candidates) else {
            tracing::info!(job_id = %self.job.id, "no usable metadata candidate");
            return Ok(());
        };

        let update = MetadataUpdate {
            itunes_ids: ItunesIds {
                track_id: best.track_id,
                artist_id: best.artist_id,
                collection_id: best.collection_id,
            },
            genre: best.genre.clone(),
            year: best.year,
            language: best.language.clone(),
        };
        self.ctx
            .songs
            .apply_metadata(self.job.song_id, &update)
            .await
            .map_err(app)?;
        Ok(())
    }

    /// Best-effort lyrics enrichment. Prefers a synced variant whose length
    /// agrees with the song duration to within two seconds.
    async fn step_enrich_lyrics(&mut self) -> std::result::Result<(), StepError> {
        let song = self.ctx.songs.get_song(self.job.song_id).await.map_err(app)?;

        let candidates = match self
            .ctx
            .lyrics
            .search(&song.artist, &song.title, song.album.as_deref())
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(job_id = %self.job.id, error = %e, "lyrics enrichment failed");
                return Ok(());
            }
        };

        let Some(choice) = select_lyrics(song.duration_ms, &candidates) else {
            tracing::info!(job_id = %self.job.id, "no usable lyrics candidate");
            return Ok(());
        };

        let request = SetLyricsRequest {
            plain_text: choice.plain_text.clone(),
            synced_text: choice.synced_text.clone(),
            language_code: choice.language_code.clone(),
            source: Some(choice.source.clone()),
            duration_hint_ms: choice.duration_hint_ms,
        };
        if let Err(e) = self.ctx.songs.set_lyrics(self.job.song_id, &request).await {
            tracing::warn!(job_id = %self.job.id, error = %e, "storing lyrics failed");
        }
        Ok(())
    }

    async fn step_finalize(&mut self) -> std::result::Result<(), StepError> {
        self.set_song_status(SongStatus::Completed).await?;

        let job = self
            .ctx
            .jobs
            .mark_terminal(
                self.job.id,
                self.task_ref,
                JobStatus::Completed,
                None,
                Some("completed"),
            )
            .await
            .map_err(app)?;

        match job {
            Some(job) => {
                self.ctx.bus.publish(Event::JobCompleted(job));
                Ok(())
            }
            None => Err(StepError::Cancelled),
        }
    }

    async fn finish_cancelled(&mut self) -> Result<PipelineOutcome> {
        // Leave partial outputs on disk; the song goes back to pending so it
        // can be re-enqueued cleanly.
        self.ctx
            .songs
            .set_status(self.job.song_id, SongStatus::Pending)
            .await
            .ok();

        let job = self
            .ctx
            .jobs
            .mark_terminal(
                self.job.id,
                self.task_ref,
                JobStatus::Cancelled,
                None,
                Some("cancelled"),
            )
            .await?;
        if let Some(job) = job {
            self.ctx.bus.publish(Event::JobCancelled(job));
        }
        Ok(PipelineOutcome::Cancelled)
    }

    async fn finish_failed(
        &mut self,
        step: Step,
        kind: JobErrorKind,
        message: String,
    ) -> Result<PipelineOutcome> {
        tracing::error!(
            job_id = %self.job.id,
            step = step.name(),
            kind = kind.as_str(),
            message = %message,
            "pipeline step failed"
        );
        self.ctx
            .songs
            .set_status(self.job.song_id, SongStatus::Failed)
            .await
            .ok();

        let detail = serde_json::json!({ "step": step.name(), "message": message });
        let job = self
            .ctx
            .jobs
            .mark_terminal(
                self.job.id,
                self.task_ref,
                JobStatus::Failed,
                Some((kind, detail)),
                Some(&message),
            )
            .await?;
        match job {
            Some(job) => {
                self.ctx.bus.publish(Event::JobFailed(job));
            }
            // A cancellation raced the failure; it wins.
            None if self.ctx.jobs.cancel_requested(self.job.id).await? => {
                return self.finish_cancelled().await;
            }
            None => {}
        }
        Ok(PipelineOutcome::Failed {
            step,
            kind,
            message,
        })
    }

    fn song_dir(&self) -> PathBuf {
        crate::services::media::song_dir(&self.ctx.library_dir, self.job.song_id)
    }

    async fn record_original(&mut self) -> std::result::Result<(), StepError> {
        self.ctx
            .songs
            .merge_paths(self.job.song_id, |paths| {
                paths.original = Some(ORIGINAL_FILE.to_string());
            })
            .await
            .map_err(app)?;
        Ok(())
    }

    async fn set_song_status(&mut self, status: SongStatus) -> std::result::Result<(), StepError> {
        self.ctx
            .songs
            .set_status(self.job.song_id, status)
            .await
            .map_err(app)
    }

    /// Move the job's status forward inside a step.
    async fn patch_status(&mut self, status: JobStatus) -> std::result::Result<(), StepError> {
        match self
            .patch_job(JobPatch {
                status: Some(status),
                ..JobPatch::default()
            })
            .await
            .map_err(app)?
        {
            PatchOutcome::Applied => Ok(()),
            PatchOutcome::Cancelling => Err(StepError::Cancelled),
            PatchOutcome::Lost => Err(StepError::ReservationLost),
        }
    }

    /// Apply a job patch and publish the update. A refused patch means the
    /// job was flagged for cancellation under us or the reservation moved to
    /// another worker; the two demand different exits.
    async fn patch_job(&mut self, patch: JobPatch) -> Result<PatchOutcome> {
        match self
            .ctx
            .jobs
            .update_job(self.job.id, self.task_ref, &patch)
            .await?
        {
            Some(job) => {
                self.job = job.clone();
                self.ctx.bus.publish(Event::JobUpdated(job));
                Ok(PatchOutcome::Applied)
            }
            None if self.ctx.jobs.cancel_requested(self.job.id).await? => {
                Ok(PatchOutcome::Cancelling)
            }
            None => Ok(PatchOutcome::Lost),
        }
    }
}

fn fatal(kind: JobErrorKind, message: String) -> StepError {
    StepError::Fatal { kind, message }
}

fn internal(e: std::io::Error) -> StepError {
    StepError::Fatal {
        kind: JobErrorKind::Internal,
        message: e.to_string(),
    }
}

fn app(e: crate::error::AppError) -> StepError {
    StepError::Fatal {
        kind: JobErrorKind::Persistence,
        message: e.to_string(),
    }
}

/// Similarity of two strings in [0, 1] based on edit distance.
fn similarity(a: &str, b: &str) -> f64 {
    let a = search::normalize(a);
    let b = search::normalize(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Pick the metadata candidate to adopt: an exact normalized (artist, title)
/// match wins; otherwise the highest combined similarity; none only when the
/// provider returned nothing.
pub fn select_best_candidate<'a>(
    artist: &str,
    title: &str,
    candidates: &'a [MetadataCandidate],
) -> Option<&'a MetadataCandidate> {
    let artist_norm = search::normalize(artist);
    let title_norm = search::normalize(title);

    if let Some(exact) = candidates.iter().find(|c| {
        search::normalize(&c.artist_name) == artist_norm
            && search::normalize(&c.track_name) == title_norm
    }) {
        return Some(exact);
    }

    candidates
        .iter()
        .map(|c| {
            let score = similarity(&c.artist_name, artist) + similarity(&c.track_name, title);
            (score, c)
        })
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c)
}

/// Pick lyrics: a synced candidate whose duration hint is within ±2 s of the
/// song duration beats all; otherwise the first synced candidate; otherwise
/// the first plain one.
pub fn select_lyrics(
    song_duration_ms: Option<i64>,
    candidates: &[LyricsCandidate],
) -> Option<&LyricsCandidate> {
    if candidates.is_empty() {
        return None;
    }

    if let Some(duration) = song_duration_ms {
        if let Some(matched) = candidates.iter().find(|c| {
            c.synced_text.is_some()
                && c.duration_hint_ms
                    .map(|hint| (hint - duration).abs() <= 2_000)
                    .unwrap_or(false)
        }) {
            return Some(matched);
        }
    }

    candidates
        .iter()
        .find(|c| c.synced_text.is_some())
        .or_else(|| candidates.first())
}

/// The standard thumbnail ladder for a video id, best first.
fn youtube_thumbnails(video_id: &str) -> Vec<Thumbnail> {
    [
        ("maxresdefault", 1280u32, 720u32),
        ("hqdefault", 480, 360),
        ("mqdefault", 320, 180),
    ]
    .into_iter()
    .map(|(name, width, height)| Thumbnail {
        url: format!("https://i.ytimg.com/vi/{}/{}.jpg", video_id, name),
        width,
        height,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(artist: &str, title: &str, track_id: i64) -> MetadataCandidate {
        MetadataCandidate {
            track_name: title.to_string(),
            artist_name: artist.to_string(),
            collection_name: None,
            track_id: Some(track_id),
            artist_id: None,
            collection_id: None,
            genre: None,
            year: None,
            language: None,
        }
    }

    #[test]
    fn exact_match_wins_over_similar() {
        let candidates = vec![
            candidate("Queen + Adam Lambert", "Bohemian Rhapsody", 1),
            candidate("queen", "bohemian rhapsody", 2),
        ];
        let best = select_best_candidate("Queen", "Bohemian Rhapsody", &candidates).unwrap();
        assert_eq!(best.track_id, Some(2));
    }

    #[test]
    fn highest_similarity_wins_without_exact_match() {
        let candidates = vec![
            candidate("Slipknot", "Duality", 9),
            candidate("Quen", "Bohemian Rapsody", 7),
        ];
        let best = select_best_candidate("Queen", "Bohemian Rhapsody", &candidates).unwrap();
        assert_eq!(best.track_id, Some(7));

        assert!(select_best_candidate("Queen", "Bohemian Rhapsody", &[]).is_none());
    }

    fn lyric(synced: Option<&str>, hint: Option<i64>) -> LyricsCandidate {
        LyricsCandidate {
            plain_text: "words".to_string(),
            synced_text: synced.map(str::to_string),
            language_code: None,
            source: "test".to_string(),
            duration_hint_ms: hint,
        }
    }

    #[test]
    fn synced_within_two_seconds_preferred() {
        let candidates = vec![
            lyric(Some("[00:01.00]a"), Some(200_000)),
            lyric(Some("[00:01.00]b"), Some(181_000)),
            lyric(None, None),
        ];
        let chosen = select_lyrics(Some(180_000), &candidates).unwrap();
        assert_eq!(chosen.duration_hint_ms, Some(181_000));
    }

    #[test]
    fn falls_back_to_first_synced_then_plain() {
        let candidates = vec![lyric(None, None), lyric(Some("[00:01.00]x"), Some(500_000))];
        let chosen = select_lyrics(Some(180_000), &candidates).unwrap();
        assert!(chosen.synced_text.is_some());

        let plain_only = vec![lyric(None, None)];
        assert!(select_lyrics(None, &plain_only).unwrap().synced_text.is_none());
    }

    #[test]
    fn upload_and_youtube_share_the_tail() {
        assert_eq!(steps_for(JobKind::Youtube)[0], Step::Fetch);
        assert_eq!(steps_for(JobKind::Upload)[0], Step::Receive);
        assert_eq!(steps_for(JobKind::Youtube)[1..], steps_for(JobKind::Upload)[1..]);
    }

    #[test]
    fn progress_bands_are_monotonic() {
        for steps in [steps_for(JobKind::Youtube), steps_for(JobKind::Upload)] {
            let mut last = 0;
            for step in steps {
                assert!(step.entry_progress() >= last);
                assert!(step.exit_progress() > step.entry_progress());
                last = step.exit_progress();
            }
            assert_eq!(steps.last().unwrap().exit_progress(), 100);
        }
    }
}
