//! Durability layer for counts snapshots
//!
//! This crate handles everything that touches disk:
//!
//! - Binary on-disk format (header, fixed-width entries, CRC footer)
//! - Crash-safe snapshot writer (write, fsync, rename, fsync directory)
//! - Validated snapshot reader with binary-search lookup
//! - Bounded page cache shared by all open snapshots
//! - Recovery: select the newest valid snapshot on open
//! - Crash testing infrastructure

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod disk_snapshot; // Snapshot writer, reader and page cache
pub mod error; // SnapshotError
pub mod format; // Binary on-disk formats and file naming
pub mod recovery; // On-open snapshot selection
pub mod testing; // Crash injection and corruption helpers

// === Re-exports ===

pub use disk_snapshot::{
    CacheStats, Page, PageCache, SnapshotEntries, SnapshotFile, SnapshotWriter, ENTRIES_PER_PAGE,
};
pub use error::SnapshotError;
pub use format::{
    list_quarantined, list_snapshots, snapshot_path, FileVersion, SnapshotHeader,
    SnapshotHeaderError, CORRUPT_SUFFIX, ENTRY_SIZE, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE,
};
pub use recovery::{RecoveryCoordinator, RecoveryReport, RecoveryResult};
pub use testing::{CrashPoint, FaultMode, WriteFault};
