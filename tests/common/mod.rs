//! Shared test harness: a complete application wired against a throwaway
//! on-disk database and the scripted provider stubs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use open_karaoke_studio_backend::services::stubs::{
    StubFetcher, StubLyricsProvider, StubMetadataProvider, StubSeparator,
};
use open_karaoke_studio_backend::services::{
    Coordinator, JobStore, PerformanceStateHandle, PipelineContext, QueueStore, SongStore,
};
use open_karaoke_studio_backend::{
    create_pool, run_migrations, AppConfig, CreateSongRequest, Environment, EventBus, Song,
    SongSource,
};

pub struct TestApp {
    pub scratch: TempDir,
    pub pool: sqlx::SqlitePool,
    pub config: AppConfig,
    pub bus: EventBus,
    pub songs: Arc<SongStore>,
    pub jobs: Arc<JobStore>,
    pub queue: Arc<QueueStore>,
    pub performance: Arc<PerformanceStateHandle>,
    pub coordinator: Arc<Coordinator>,
    pub fetcher: Arc<StubFetcher>,
    pub separator: Arc<StubSeparator>,
    pub metadata: Arc<StubMetadataProvider>,
    pub lyrics: Arc<StubLyricsProvider>,
}

pub struct TestAppBuilder {
    fetcher: StubFetcher,
    separator: StubSeparator,
    metadata: StubMetadataProvider,
    lyrics: StubLyricsProvider,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            fetcher: StubFetcher::default(),
            separator: StubSeparator::default(),
            metadata: StubMetadataProvider::default(),
            lyrics: StubLyricsProvider::default(),
        }
    }
}

impl TestAppBuilder {
    pub fn fetcher(mut self, fetcher: StubFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn separator(mut self, separator: StubSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn metadata(mut self, metadata: StubMetadataProvider) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn lyrics(mut self, lyrics: StubLyricsProvider) -> Self {
        self.lyrics = lyrics;
        self
    }

    pub async fn build(self) -> TestApp {
        let scratch = TempDir::new().expect("scratch dir");
        let library_dir = scratch.path().join("library");
        tokio::fs::create_dir_all(&library_dir).await.unwrap();

        let database_url = format!(
            "sqlite:{}?mode=rwc",
            scratch.path().join("test.db").display()
        );
        let pool = create_pool(&database_url).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let config = test_config(library_dir, database_url);

        let bus = EventBus::default();
        let songs = Arc::new(SongStore::new(pool.clone()));
        let jobs = Arc::new(JobStore::new(pool.clone()));
        let queue = Arc::new(QueueStore::new(pool.clone()));
        let performance = Arc::new(PerformanceStateHandle::default());

        let coordinator = Arc::new(Coordinator::new(
            songs.clone(),
            jobs.clone(),
            queue.clone(),
            performance.clone(),
            bus.clone(),
            config.clone(),
        ));

        TestApp {
            scratch,
            pool,
            config,
            bus,
            songs,
            jobs,
            queue,
            performance,
            coordinator,
            fetcher: Arc::new(self.fetcher),
            separator: Arc::new(self.separator),
            metadata: Arc::new(self.metadata),
            lyrics: Arc::new(self.lyrics),
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        TestAppBuilder::default().build().await
    }

    pub fn pipeline_ctx(&self) -> Arc<PipelineContext> {
        Arc::new(PipelineContext {
            songs: self.songs.clone(),
            jobs: self.jobs.clone(),
            bus: self.bus.clone(),
            fetcher: self.fetcher.clone(),
            separator: self.separator.clone(),
            metadata: self.metadata.clone(),
            lyrics: self.lyrics.clone(),
            library_dir: self.config.storage.library_dir.clone(),
            timeouts: self.config.worker.step_timeouts.clone(),
        })
    }

    /// Create a youtube song the usual way.
    pub async fn create_youtube_song(&self, title: &str, artist: &str, video_id: &str) -> Song {
        self.coordinator
            .create_song(&CreateSongRequest {
                title: title.to_string(),
                artist: artist.to_string(),
                album: None,
                source: SongSource::Youtube,
                source_url: None,
                video_id: Some(video_id.to_string()),
            })
            .await
            .expect("create song")
    }

    pub async fn create_upload_song(&self, title: &str, artist: &str) -> Song {
        self.coordinator
            .create_song(&CreateSongRequest {
                title: title.to_string(),
                artist: artist.to_string(),
                album: None,
                source: SongSource::Upload,
                source_url: None,
                video_id: None,
            })
            .await
            .expect("create song")
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, job_id: Uuid, timeout: Duration) -> open_karaoke_studio_backend::Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.jobs.get_job(job_id).await.expect("job");
            if job.is_terminal() {
                return job;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("job {} did not reach a terminal state in time", job_id);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn test_config(library_dir: PathBuf, database_url: String) -> AppConfig {
    use open_karaoke_studio_backend::config::*;

    AppConfig {
        environment: Environment::Development,
        server: ServerConfig {
            http_bind: "127.0.0.1:0".to_string(),
            cors_origins: vec!["*".to_string()],
        },
        storage: StorageConfig {
            library_dir,
            database_url,
        },
        worker: WorkerSettings {
            concurrency: 2,
            step_timeouts: StepTimeouts {
                fetch: Duration::from_secs(5),
                separate: Duration::from_secs(5),
                metadata: Duration::from_secs(2),
                lyrics: Duration::from_secs(2),
            },
            job_retention: Duration::from_secs(3_600),
            stale_reservation_after: Duration::from_secs(60),
        },
        providers: ProviderSettings {
            separator_device: "cpu".to_string(),
            fetcher_command: "true".to_string(),
            separator_command: "true".to_string(),
            metadata_base_url: "http://127.0.0.1:9".to_string(),
            lyrics_base_url: "http://127.0.0.1:9".to_string(),
        },
    }
}
