use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use open_karaoke_studio_backend::services::{
    CommandFetcher, CommandSeparator, Coordinator, Dispatcher, ItunesMetadataProvider, JobStore,
    LrclibLyricsProvider, PerformanceStateHandle, PipelineContext, PushHub, QueueStore, SongStore,
};
use open_karaoke_studio_backend::{
    create_pool, create_router, run_migrations, AppConfig, AppState, EventBus,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        bind = %config.server.http_bind,
        library = %config.storage.library_dir.display(),
        workers = config.worker.concurrency,
        "starting open karaoke studio backend"
    );

    tokio::fs::create_dir_all(&config.storage.library_dir).await?;

    let db_pool = create_pool(&config.storage.database_url).await?;
    run_migrations(&db_pool).await?;

    let bus = EventBus::default();
    let songs = Arc::new(SongStore::new(db_pool.clone()));
    let jobs = Arc::new(JobStore::new(db_pool.clone()));
    let queue = Arc::new(QueueStore::new(db_pool.clone()));
    let performance = Arc::new(PerformanceStateHandle::default());

    let metadata_provider: Arc<dyn open_karaoke_studio_backend::services::MetadataProvider> =
        Arc::new(ItunesMetadataProvider::new(
            config.providers.metadata_base_url.clone(),
        ));
    let lyrics_provider: Arc<dyn open_karaoke_studio_backend::services::LyricsProvider> =
        Arc::new(LrclibLyricsProvider::new(
            config.providers.lyrics_base_url.clone(),
        ));

    let coordinator = Arc::new(Coordinator::new(
        songs.clone(),
        jobs.clone(),
        queue.clone(),
        performance,
        bus.clone(),
        config.clone(),
    ));

    let pipeline_ctx = Arc::new(PipelineContext {
        songs: songs.clone(),
        jobs: jobs.clone(),
        bus: bus.clone(),
        fetcher: Arc::new(CommandFetcher::new(config.providers.fetcher_command.clone())),
        separator: Arc::new(CommandSeparator::new(
            config.providers.separator_command.clone(),
            config.providers.separator_device.clone(),
        )),
        metadata: metadata_provider.clone(),
        lyrics: lyrics_provider.clone(),
        library_dir: config.storage.library_dir.clone(),
        timeouts: config.worker.step_timeouts.clone(),
    });

    let dispatcher = Dispatcher::new(pipeline_ctx, queue.clone(), config.worker.clone());
    let dispatcher_handle = dispatcher.start().await?;

    let push_hub = Arc::new(PushHub::new(
        coordinator.clone(),
        jobs.clone(),
        bus.clone(),
        config.worker.job_retention,
    ));

    let state = AppState {
        db_pool,
        config: config.clone(),
        songs,
        jobs,
        queue,
        coordinator,
        push_hub,
        metadata_provider,
        lyrics_provider,
        bus,
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.http_bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher_handle.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
