//! Crash-safe counts snapshot I/O
//!
//! - `writer`: write-fsync-rename publication of a sorted snapshot
//! - `reader`: validated open, binary-search lookup, sequential entries
//! - `cache`: owned, bounded LRU of decoded pages used by lookups

pub mod cache;
pub mod reader;
pub mod writer;

pub use cache::{CacheStats, Page, PageCache, ENTRIES_PER_PAGE};
pub use reader::{SnapshotEntries, SnapshotFile};
pub use writer::SnapshotWriter;
