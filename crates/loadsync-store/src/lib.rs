//! Storage backends for loadsync.
//!
//! - [`MemoryLog`] - an in-memory [`MetadataLog`](loadsync_core::MetadataLog)
//!   keeping every committed snapshot
//! - [`MemoryContentStore`] - blobs held in memory
//! - [`FsContentStore`] - gzip-compressed blobs in a directory, keyed by hash

mod fs_content;
mod memory_content;
mod memory_log;

pub use fs_content::FsContentStore;
pub use memory_content::MemoryContentStore;
pub use memory_log::MemoryLog;
