pub mod files;
pub mod jobs;
pub mod karaoke_queue;
pub mod lyrics;
pub mod metadata;
pub mod push;
pub mod songs;
pub mod youtube;
