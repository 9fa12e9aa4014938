pub mod artist;
pub mod job;
pub mod lyrics;
pub mod performance;
pub mod queue;
pub mod song;

pub use artist::Artist;
pub use job::{
    Job, JobErrorKind, JobKind, JobNotes, JobPatch, JobStatus, JobStatusSummary,
};
pub use lyrics::{Lyrics, SetLyricsRequest};
pub use performance::{LyricsSize, PerformanceControlPatch, PerformanceState};
pub use queue::{AddToQueueRequest, QueueEntry, QueueEntryStatus, ReorderQueueRequest};
pub use song::{
    CreateSongRequest, ItunesIds, Page, Song, SongPatch, SongPaths, SongSource, SongStatus,
    Thumbnail,
};
