//! Live-session coordination: create-before-enqueue ordering, performance
//! control broadcast, and playback events.

mod common;

use std::time::Duration;

use common::TestApp;
use open_karaoke_studio_backend::{
    AppError, BusMessage, CreateSongRequest, Event, JobStatus, LyricsSize,
    PerformanceControlPatch, SongSource,
};
use uuid::Uuid;

async fn next_event(
    sub: &mut open_karaoke_studio_backend::events::Subscription,
) -> Event {
    match tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("event in time")
        .expect("bus open")
    {
        BusMessage::Event(event) => event,
        BusMessage::Lost(_) => panic!("unexpected loss marker"),
    }
}

#[tokio::test]
async fn enqueue_requires_the_song_to_exist_first() {
    let app = TestApp::new().await;

    let err = app
        .coordinator
        .enqueue_youtube_job(Uuid::nil(), "fJ9rUzIMcZQ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(app.jobs.list_jobs().await.unwrap().is_empty(), "no job row written");

    let song = app
        .create_youtube_song("Bohemian Rhapsody", "Queen", "fJ9rUzIMcZQ")
        .await;
    assert!(app.songs.get_song(song.id).await.is_ok());

    let job = app
        .coordinator
        .enqueue_youtube_job(song.id, "fJ9rUzIMcZQ")
        .await
        .unwrap();
    assert_eq!(job.song_id, song.id);
    assert_eq!(job.status(), JobStatus::Pending);
    assert!(app.songs.get_song(song.id).await.is_ok());
}

#[tokio::test]
async fn source_url_is_canonicalized_to_a_video_id() {
    let app = TestApp::new().await;
    let song = app
        .coordinator
        .create_song(&CreateSongRequest {
            title: "Bohemian Rhapsody".to_string(),
            artist: "Queen".to_string(),
            album: None,
            source: SongSource::Youtube,
            source_url: Some("https://www.youtube.com/watch?v=fJ9rUzIMcZQ&t=30".to_string()),
            video_id: None,
        })
        .await
        .unwrap();
    assert_eq!(song.video_id.as_deref(), Some("fJ9rUzIMcZQ"));

    let err = app
        .coordinator
        .create_song(&CreateSongRequest {
            title: "X".to_string(),
            artist: "Y".to_string(),
            album: None,
            source: SongSource::Youtube,
            source_url: Some("https://example.com/not-a-video".to_string()),
            video_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter { .. }));

    let err = app
        .coordinator
        .create_song(&CreateSongRequest {
            title: "X".to_string(),
            artist: "Y".to_string(),
            album: None,
            source: SongSource::Youtube,
            source_url: None,
            video_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingParameter { .. }));
}

#[tokio::test]
async fn control_changes_broadcast_to_every_subscriber() {
    let app = TestApp::new().await;
    let mut sub1 = app.bus.subscribe("performance.*");
    let mut sub2 = app.bus.subscribe("performance.*");

    let state = app
        .coordinator
        .update_performance_control(&PerformanceControlPatch {
            vocal_volume: Some(0.25),
            ..PerformanceControlPatch::default()
        })
        .await
        .unwrap();
    assert_eq!(state.vocal_volume, 0.25);

    for sub in [&mut sub1, &mut sub2] {
        match next_event(sub).await {
            Event::PerformanceChanged { patch, state } => {
                assert_eq!(patch.vocal_volume, Some(0.25));
                assert!(patch.instrumental_volume.is_none());
                assert_eq!(state.vocal_volume, 0.25);
            }
            other => panic!("unexpected event {:?}", other.topic()),
        }
    }

    // A client connecting afterwards snapshots the new state.
    let snapshot = app.coordinator.performance_state().await;
    assert_eq!(snapshot.vocal_volume, 0.25);
    assert_eq!(snapshot.lyrics_size, LyricsSize::Medium);
}

#[tokio::test]
async fn control_patches_are_range_checked() {
    let app = TestApp::new().await;
    let err = app
        .coordinator
        .update_performance_control(&PerformanceControlPatch {
            vocal_volume: Some(1.5),
            ..PerformanceControlPatch::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationFailed(_)));

    let err = app.coordinator.playback_seek(-5).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter { .. }));

    // An empty patch is a no-op returning the current state, not an event.
    let mut sub = app.bus.subscribe("performance.*");
    let state = app
        .coordinator
        .update_performance_control(&PerformanceControlPatch::default())
        .await
        .unwrap();
    assert_eq!(state.vocal_volume, 0.0);
    app.coordinator.playback_play().await.unwrap();
    match next_event(&mut sub).await {
        Event::PlaybackPlay => {}
        other => panic!("expected play, got {:?}", other.topic()),
    }
}

#[tokio::test]
async fn playback_commands_publish_in_order() {
    let app = TestApp::new().await;
    let mut sub = app.bus.subscribe("performance.*");

    app.coordinator.playback_play().await.unwrap();
    app.coordinator.playback_seek(15_000).await.unwrap();
    app.coordinator.playback_pause().await.unwrap();

    assert!(matches!(next_event(&mut sub).await, Event::PlaybackPlay));
    match next_event(&mut sub).await {
        Event::PlaybackSeek { position_ms } => assert_eq!(position_ms, 15_000),
        other => panic!("expected seek, got {:?}", other.topic()),
    }
    assert!(matches!(next_event(&mut sub).await, Event::PlaybackPause));

    let state = app.coordinator.performance_state().await;
    assert!(!state.is_playing);
}

#[tokio::test]
async fn cancelling_a_pending_job_publishes_its_terminal_event() {
    let app = TestApp::new().await;
    let song = app
        .create_youtube_song("Bohemian Rhapsody", "Queen", "fJ9rUzIMcZQ")
        .await;
    let job = app
        .coordinator
        .enqueue_youtube_job(song.id, "fJ9rUzIMcZQ")
        .await
        .unwrap();

    let mut sub = app.bus.subscribe("job.*");
    let cancelled = app.coordinator.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status(), JobStatus::Cancelled);

    match next_event(&mut sub).await {
        Event::JobCancelled(j) => assert_eq!(j.id, job.id),
        other => panic!("expected cancelled, got {:?}", other.topic()),
    }

    // Cancelling again is a no-op that reports the job as-is.
    let again = app.coordinator.cancel_job(job.id).await.unwrap();
    assert_eq!(again.status(), JobStatus::Cancelled);
}
