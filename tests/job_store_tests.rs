//! Job store invariants: creation ordering, atomic reservation, guarded
//! updates, recovery and retention.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::TestApp;
use open_karaoke_studio_backend::{
    AppError, JobKind, JobNotes, JobPatch, JobStatus,
};
use uuid::Uuid;

fn youtube_notes(video_id: &str) -> JobNotes {
    JobNotes::Youtube {
        video_id: video_id.to_string(),
        source_url: None,
    }
}

#[tokio::test]
async fn save_job_requires_existing_song() {
    let app = TestApp::new().await;

    let err = app
        .jobs
        .save_job(Uuid::new_v4(), JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(app.jobs.list_jobs().await.unwrap().is_empty());

    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    let job = app
        .jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();
    assert_eq!(job.song_id, song.id);
    assert_eq!(job.status(), JobStatus::Pending);
    assert!(job.task_ref.is_none());
}

#[tokio::test]
async fn concurrent_reservation_hands_each_job_to_one_worker() {
    let app = TestApp::new().await;

    for i in 0..10 {
        let video = format!("AAAAAAAAAA{}", i);
        let song = app.create_youtube_song(&format!("Song {}", i), "Artist", &video).await;
        app.jobs
            .save_job(song.id, JobKind::Youtube, &youtube_notes(&video))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let jobs = app.jobs.clone();
        handles.push(tokio::spawn(async move {
            let mut reserved = Vec::new();
            while let Some(job) = jobs.reserve_next_runnable().await.unwrap() {
                reserved.push(job.id);
            }
            reserved
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    assert_eq!(all.len(), 10, "every job reserved exactly once");
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), 10);
}

#[tokio::test]
async fn updates_from_stale_reservations_are_ignored() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    app.jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();
    let task_ref = reserved.task_ref.unwrap();

    // A different task ref gets nowhere.
    let outcome = app
        .jobs
        .update_job(
            reserved.id,
            Uuid::new_v4(),
            &JobPatch {
                progress: Some(50),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(app.jobs.get_job(reserved.id).await.unwrap().progress, 0);

    // The owner moves progress forward; a later lower value is ignored.
    app.jobs
        .update_job(
            reserved.id,
            task_ref,
            &JobPatch {
                progress: Some(50),
                status: Some(JobStatus::Processing),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();
    let after = app
        .jobs
        .update_job(
            reserved.id,
            task_ref,
            &JobPatch {
                progress: Some(30),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.progress, 50, "progress never decreases");

    // Backwards status transitions are dropped.
    let outcome = app
        .jobs
        .update_job(
            reserved.id,
            task_ref,
            &JobPatch {
                status: Some(JobStatus::Downloading),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn terminal_states_are_sticky() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    app.jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();
    let task_ref = reserved.task_ref.unwrap();

    let completed = app
        .jobs
        .mark_terminal(reserved.id, task_ref, JobStatus::Completed, None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.progress, 100);
    assert!(completed.ended_at.is_some());

    // Second terminal write is a no-op; cancellation after the fact too.
    assert!(app
        .jobs
        .mark_terminal(reserved.id, task_ref, JobStatus::Failed, None, None)
        .await
        .unwrap()
        .is_none());
    assert!(app.jobs.request_cancel(reserved.id).await.unwrap().is_none());
    assert_eq!(
        app.jobs.get_job(reserved.id).await.unwrap().status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn pending_jobs_cancel_immediately_and_running_jobs_flag() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    let pending = app
        .jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let cancelled = app.jobs.request_cancel(pending.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status(), JobStatus::Cancelled);

    let song2 = app.create_youtube_song("Other", "Artist", "BBBBBBBBBBB").await;
    app.jobs
        .save_job(song2.id, JobKind::Youtube, &youtube_notes("BBBBBBBBBBB"))
        .await
        .unwrap();
    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();

    let flagged = app.jobs.request_cancel(reserved.id).await.unwrap().unwrap();
    assert_eq!(flagged.status(), JobStatus::Cancelling);
    assert!(app.jobs.cancel_requested(reserved.id).await.unwrap());
}

#[tokio::test]
async fn stale_reservations_reopen() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    app.jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();

    // Fresh reservations are left alone.
    assert_eq!(
        app.jobs
            .reopen_stale_reservations(Duration::from_secs(60))
            .await
            .unwrap(),
        0
    );

    // Backdate the reservation beyond the threshold.
    sqlx::query("UPDATE jobs SET reserved_at = datetime('now', '-5 minutes') WHERE id = ?")
        .bind(reserved.id)
        .execute(&app.pool)
        .await
        .unwrap();

    assert_eq!(
        app.jobs
            .reopen_stale_reservations(Duration::from_secs(60))
            .await
            .unwrap(),
        1
    );
    let reopened = app.jobs.get_job(reserved.id).await.unwrap();
    assert_eq!(reopened.status(), JobStatus::Pending);
    assert!(reopened.task_ref.is_none());

    // And it can be reserved again.
    assert!(app.jobs.reserve_next_runnable().await.unwrap().is_some());
}

#[tokio::test]
async fn startup_recovery_reopens_inflight_jobs() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    let job = app
        .jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();
    app.jobs
        .update_job(
            reserved.id,
            reserved.task_ref.unwrap(),
            &JobPatch {
                status: Some(JobStatus::Processing),
                progress: Some(47),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();

    // "Process restart": recovery reopens the in-flight job.
    let reopened = app.jobs.recover_orphaned_jobs().await.unwrap();
    assert_eq!(reopened, 1);
    let recovered = app.jobs.get_job(job.id).await.unwrap();
    assert_eq!(recovered.status(), JobStatus::Pending);

    // Progress restarts on the next reservation.
    let reserved = app.jobs.reserve_next_runnable().await.unwrap().unwrap();
    assert_eq!(reserved.progress, 0);
}

#[tokio::test]
async fn dismiss_only_applies_to_terminal_jobs() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Artist", "fJ9rUzIMcZQ").await;
    let job = app
        .jobs
        .save_job(song.id, JobKind::Youtube, &youtube_notes("fJ9rUzIMcZQ"))
        .await
        .unwrap();

    let err = app.jobs.dismiss_job(job.id).await.unwrap_err();
    assert!(matches!(err, AppError::OperationNotAllowed { .. }));

    app.jobs.request_cancel(job.id).await.unwrap();
    app.jobs.dismiss_job(job.id).await.unwrap();
    assert!(matches!(
        app.jobs.get_job(job.id).await.unwrap_err(),
        AppError::NotFound { .. }
    ));
}

#[tokio::test]
async fn status_summary_counts_by_bucket() {
    let app = TestApp::new().await;
    for i in 0..3 {
        let video = format!("CCCCCCCCCC{}", i);
        let song = app.create_youtube_song(&format!("S{}", i), "A", &video).await;
        app.jobs
            .save_job(song.id, JobKind::Youtube, &youtube_notes(&video))
            .await
            .unwrap();
    }
    app.jobs.reserve_next_runnable().await.unwrap().unwrap();

    let summary = app.jobs.status_summary().await.unwrap();
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.active, 1);
    assert_eq!(summary.queue_depth, 2);
    assert_eq!(summary.completed + summary.failed + summary.cancelled, 0);
}
