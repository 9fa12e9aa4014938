// Stores
pub mod job_store;
pub mod queue_store;
pub mod song_store;

// Pipeline and workers
pub mod dispatcher;
pub mod pipeline;

// External collaborators
pub mod itunes;
pub mod lrclib;
pub mod media;
pub mod providers;

// Live session
pub mod coordinator;
pub mod performance;
pub mod push_hub;

pub mod stubs;

pub use coordinator::Coordinator;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use itunes::ItunesMetadataProvider;
pub use job_store::JobStore;
pub use lrclib::LrclibLyricsProvider;
pub use media::{CommandFetcher, CommandSeparator};
pub use performance::PerformanceStateHandle;
pub use pipeline::{Pipeline, PipelineContext, PipelineOutcome};
pub use providers::{Fetcher, LyricsProvider, MetadataProvider, Separator};
pub use push_hub::PushHub;
pub use queue_store::QueueStore;
pub use song_store::{ListOptions, SongStore};
