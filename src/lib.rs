//! Open Karaoke Studio backend.
//!
//! Self-hosted karaoke server: ingests audio from uploads and YouTube,
//! separates vocals from instrumentals through an external engine, enriches
//! songs with metadata and lyrics, and exposes the library plus a live
//! karaoke session (queue, performance controls) over HTTP and WebSocket
//! push channels.

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lrc;
pub mod middleware;
pub mod models;
pub mod search;
pub mod services;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, Environment, StepTimeouts, WorkerSettings};
pub use database::{create_pool, health_check as db_health_check, run_migrations};
pub use error::{AppError, ErrorResponse, Result};
pub use events::{BusMessage, Event, EventBus};
pub use middleware::create_cors_layer;
pub use models::*;
pub use services::{
    Coordinator, Dispatcher, DispatcherHandle, JobStore, PipelineContext, PushHub, QueueStore,
    SongStore,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: AppConfig,
    pub songs: Arc<SongStore>,
    pub jobs: Arc<JobStore>,
    pub queue: Arc<QueueStore>,
    pub coordinator: Arc<Coordinator>,
    pub push_hub: Arc<PushHub>,
    pub metadata_provider: Arc<dyn services::MetadataProvider>,
    pub lyrics_provider: Arc<dyn services::LyricsProvider>,
    pub bus: EventBus,
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let song_routes = Router::new()
        .route("/songs", get(handlers::songs::list_songs_handler))
        .route("/songs", post(handlers::songs::create_song_handler))
        .route("/songs/search", get(handlers::songs::search_songs_handler))
        .route("/songs/artists", get(handlers::songs::list_artists_handler))
        .route(
            "/songs/by-artist/:artist_name",
            get(handlers::songs::songs_by_artist_handler),
        )
        .route("/songs/:id", get(handlers::songs::get_song_handler))
        .route("/songs/:id", axum::routing::patch(handlers::songs::patch_song_handler))
        .route("/songs/:id", delete(handlers::songs::delete_song_handler))
        .route(
            "/songs/:id/download/:track",
            get(handlers::files::download_handler),
        )
        .route("/songs/:id/thumbnail", get(handlers::files::thumbnail_handler))
        .route(
            "/songs/:id/thumbnail.jpg",
            get(handlers::files::thumbnail_handler),
        )
        .route(
            "/songs/:id/thumbnail.webp",
            get(handlers::files::thumbnail_handler),
        )
        .route(
            "/songs/:id/thumbnail.png",
            get(handlers::files::thumbnail_handler),
        )
        .route("/songs/:id/cover.jpg", get(handlers::files::cover_handler))
        .route("/songs/:id/lyrics", get(song_lyrics_alias_handler));

    let lyrics_routes = Router::new()
        .route("/lyrics/search", get(handlers::lyrics::search_lyrics_handler))
        .route("/lyrics/:song_id", get(handlers::lyrics::get_lyrics_handler))
        .route("/lyrics/:song_id", post(handlers::lyrics::set_lyrics_handler));

    let job_routes = Router::new()
        .route("/jobs", get(handlers::jobs::list_jobs_handler))
        .route("/jobs/status", get(handlers::jobs::job_status_handler))
        .route("/jobs/:id", get(handlers::jobs::get_job_handler))
        .route("/jobs/:id/cancel", post(handlers::jobs::cancel_job_handler))
        .route(
            "/jobs/:id/dismiss",
            post(handlers::jobs::dismiss_job_handler),
        );

    let queue_routes = Router::new()
        .route(
            "/karaoke-queue",
            get(handlers::karaoke_queue::list_queue_handler),
        )
        .route(
            "/karaoke-queue",
            post(handlers::karaoke_queue::add_to_queue_handler),
        )
        .route(
            "/karaoke-queue/reorder",
            put(handlers::karaoke_queue::reorder_queue_handler),
        )
        .route(
            "/karaoke-queue/advance",
            post(handlers::karaoke_queue::advance_queue_handler),
        )
        .route(
            "/karaoke-queue/:entry_id",
            delete(handlers::karaoke_queue::remove_queue_entry_handler),
        );

    let api = Router::new()
        .merge(song_routes)
        .merge(lyrics_routes)
        .merge(job_routes)
        .merge(queue_routes)
        .route(
            "/metadata/search",
            get(handlers::metadata::search_metadata_handler),
        )
        .route(
            "/youtube/download",
            post(handlers::youtube::youtube_download_handler),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .route("/ws/jobs", get(handlers::push::jobs_channel_handler))
        .route(
            "/ws/performance",
            get(handlers::push::performance_channel_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&state.config.server)),
        )
        .with_state(state)
}

/// `GET /songs/{id}/lyrics` convenience alias.
async fn song_lyrics_alias_handler(
    state: State<AppState>,
    path: axum::extract::Path<uuid::Uuid>,
) -> Result<Json<models::Lyrics>> {
    handlers::lyrics::get_lyrics_handler(state, path).await
}

/// Health check: store reachability plus process liveness.
async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let store = match database::health_check(&state.db_pool).await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    Ok(Json(serde_json::json!({
        "status": if store == "up" { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "services": { "store": store },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
