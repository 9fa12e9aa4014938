//! Library store behavior: round trips, dedup, fuzzy search, the artist
//! view, lyrics validation, and delete protection.

mod common;

use common::TestApp;
use open_karaoke_studio_backend::services::song_store::ListOptions;
use open_karaoke_studio_backend::{
    AppError, CreateSongRequest, JobKind, JobNotes, SetLyricsRequest, SongPatch, SongSource,
};

#[tokio::test]
async fn created_song_round_trips() {
    let app = TestApp::new().await;
    let created = app
        .coordinator
        .create_song(&CreateSongRequest {
            title: "Bohemian Rhapsody".to_string(),
            artist: "Queen".to_string(),
            album: Some("A Night at the Opera".to_string()),
            source: SongSource::Youtube,
            source_url: None,
            video_id: Some("fJ9rUzIMcZQ".to_string()),
        })
        .await
        .unwrap();

    let fetched = app.songs.get_song(created.id).await.unwrap();
    assert_eq!(fetched.title, "Bohemian Rhapsody");
    assert_eq!(fetched.artist, "Queen");
    assert_eq!(fetched.album.as_deref(), Some("A Night at the Opera"));
    assert_eq!(fetched.video_id.as_deref(), Some("fJ9rUzIMcZQ"));
    assert_eq!(fetched.source(), SongSource::Youtube);
    assert!(!fetched.favorite);
    assert!(fetched.paths.original.is_none());
}

#[tokio::test]
async fn duplicate_video_id_dedups_to_existing_row() {
    let app = TestApp::new().await;
    let first = app
        .create_youtube_song("Bohemian Rhapsody", "Queen", "fJ9rUzIMcZQ")
        .await;

    // Same video offered again, this time as a share URL.
    let second = app
        .coordinator
        .create_song(&CreateSongRequest {
            title: "Bohemian Rhapsody (again)".to_string(),
            artist: "Queen".to_string(),
            album: None,
            source: SongSource::Youtube,
            source_url: Some("https://youtu.be/fJ9rUzIMcZQ".to_string()),
            video_id: None,
        })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.title, "Bohemian Rhapsody");

    // The store itself still reports the conflict.
    let err = app
        .songs
        .create_song("X", "Y", None, SongSource::Youtube, None, Some("fJ9rUzIMcZQ"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
}

#[tokio::test]
async fn search_is_fuzzy_and_deterministic() {
    let app = TestApp::new().await;
    app.create_youtube_song("Bohemian Rhapsody", "Queen", "fJ9rUzIMcZQ")
        .await;
    app.create_youtube_song("Somebody to Love", "Queen", "kijpcUv-b8M")
        .await;
    app.create_youtube_song("Rhapsody in Blue", "Gershwin", "ynEOo28lsbc")
        .await;

    // Typo within edit distance 2 still hits.
    let page = app.songs.search_songs("bohemain", 0, 10, false).await.unwrap();
    assert_eq!(page.items[0].title, "Bohemian Rhapsody");

    // Title relevance outranks the cross-artist match.
    let page = app.songs.search_songs("rhapsody", 0, 10, false).await.unwrap();
    assert_eq!(page.total, 2);

    // Identical queries against an unchanged store serialize identically.
    let a = serde_json::to_string(&app.songs.search_songs("queen", 0, 10, false).await.unwrap())
        .unwrap();
    let b = serde_json::to_string(&app.songs.search_songs("queen", 0, 10, false).await.unwrap())
        .unwrap();
    assert_eq!(a, b);

    // Every token must match somewhere.
    let page = app
        .songs
        .search_songs("queen zzzzzzz", 0, 10, false)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn artist_listing_sorts_the_prefix_and_numerics() {
    let app = TestApp::new().await;
    app.create_youtube_song("Dancing Queen", "ABBA", "xFrGuyw1V8s").await;
    app.create_youtube_song("Let It Be", "The Beatles", "QDYfEBY9NM4").await;
    app.create_youtube_song("Changes", "2Pac", "eXvBjCO19QY").await;
    app.create_youtube_song("Hey Jude", "The Beatles", "A_MjCqQoLLA").await;

    let page = app.songs.list_artists(None, 0, 10).await.unwrap();
    let names: Vec<_> = page.items.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["2Pac", "ABBA", "The Beatles"]);

    let letters: Vec<_> = page.items.iter().map(|a| a.first_letter.as_str()).collect();
    assert_eq!(letters, vec!["#", "A", "B"]);

    let counts: Vec<_> = page.items.iter().map(|a| a.song_count).collect();
    assert_eq!(counts, vec![1, 1, 2]);

    // Search narrows the listing.
    let page = app.songs.list_artists(Some("beat"), 0, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "The Beatles");

    // Songs for one artist match on the normalized name.
    let songs = app
        .songs
        .list_songs_by_artist("the beatles", &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(songs.total, 2);
}

#[tokio::test]
async fn unknown_sort_field_is_a_validation_error() {
    let app = TestApp::new().await;
    let err = app
        .songs
        .list_songs(&ListOptions {
            sort_by: Some("sneaky; DROP TABLE songs".to_string()),
            ..ListOptions::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter { .. }));

    let err = app
        .songs
        .list_songs(&ListOptions {
            direction: Some("sideways".to_string()),
            ..ListOptions::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter { .. }));
}

#[tokio::test]
async fn patch_updates_fields_and_renormalizes_artist() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Queen", "fJ9rUzIMcZQ").await;

    let patched = app
        .songs
        .update_song(
            song.id,
            &SongPatch {
                artist: Some("The Beatles".to_string()),
                favorite: Some(true),
                ..SongPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(patched.favorite);
    assert_eq!(patched.artist, "The Beatles");

    let songs = app
        .songs
        .list_songs_by_artist("THE  BEATLES", &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(songs.total, 1);
}

#[tokio::test]
async fn lyrics_validate_and_round_trip() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Queen", "fJ9rUzIMcZQ").await;

    let err = app
        .songs
        .set_lyrics(
            song.id,
            &SetLyricsRequest {
                plain_text: "words".to_string(),
                synced_text: Some("[00:30.00]late\n[00:10.00]early".to_string()),
                language_code: None,
                source: None,
                duration_hint_ms: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter { .. }));

    let stored = app
        .songs
        .set_lyrics(
            song.id,
            &SetLyricsRequest {
                plain_text: "Is this the real life".to_string(),
                synced_text: Some("[00:01.00]Is this the real life".to_string()),
                language_code: Some("en".to_string()),
                source: Some("manual".to_string()),
                duration_hint_ms: Some(354_000),
            },
        )
        .await
        .unwrap();
    assert_eq!(stored.song_id, song.id);

    let fetched = app.songs.get_lyrics(song.id).await.unwrap();
    assert_eq!(fetched.plain_text, "Is this the real life");
    assert_eq!(fetched.duration_hint_ms, Some(354_000));
}

#[tokio::test]
async fn delete_refuses_songs_with_active_jobs() {
    let app = TestApp::new().await;
    let song = app.create_youtube_song("Song", "Queen", "fJ9rUzIMcZQ").await;
    let job = app
        .jobs
        .save_job(
            song.id,
            JobKind::Youtube,
            &JobNotes::Youtube {
                video_id: "fJ9rUzIMcZQ".to_string(),
                source_url: None,
            },
        )
        .await
        .unwrap();

    let err = app.songs.delete_song(song.id).await.unwrap_err();
    assert!(matches!(err, AppError::InUse { .. }));

    // Once the job is terminal the song (and its terminal jobs) can go.
    app.jobs.request_cancel(job.id).await.unwrap();
    app.songs.delete_song(song.id).await.unwrap();
    assert!(matches!(
        app.songs.get_song(song.id).await.unwrap_err(),
        AppError::NotFound { .. }
    ));
    assert!(app.jobs.list_jobs().await.unwrap().is_empty());
}
