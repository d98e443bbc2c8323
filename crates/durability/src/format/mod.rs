//! On-disk byte formats for counts snapshots.
//!
//! This module centralizes all serialization logic for persistent storage.
//! Keeping serialization separate from operational logic (how snapshots are
//! written, read and rotated) makes format evolution easier to manage.
//!
//! # File Structure
//!
//! ```text
//! +------------------+ 0
//! | SnapshotHeader   | 64 bytes
//! +------------------+ 64
//! | Entry 0          | 32 bytes (key 16 + counter pair 16)
//! | Entry 1          |
//! | ...              | strictly ascending by key
//! +------------------+
//! | Footer           | CRC32 (4) + "STNC" (4)
//! +------------------+
//! ```
//!
//! # Module Structure
//!
//! - `header`: snapshot header and [`FileVersion`]
//! - `entry`: fixed-width entry records and footer
//! - `naming`: file names of published, temporary and quarantined snapshots

pub mod entry;
pub mod header;
pub mod naming;

pub use entry::{
    decode_entry, decode_footer, encode_entry, encode_footer, expected_file_size, ENTRY_SIZE,
    FOOTER_SIZE, TRAILER_MAGIC,
};
pub use header::{
    now_micros, FileVersion, SnapshotHeader, SnapshotHeaderError, SNAPSHOT_FORMAT_VERSION,
    SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC,
};
pub use naming::{
    is_temp_name, list_quarantined, list_snapshots, list_temp_files, parse_quarantined_name,
    parse_snapshot_name, snapshot_path, temp_path, CORRUPT_SUFFIX, SNAPSHOT_EXTENSION,
};
