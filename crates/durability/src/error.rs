//! Snapshot I/O errors

use countsdb_core::{CorruptKeyError, CountsKey};

use crate::format::SnapshotHeaderError;

/// Errors that can occur when writing or reading a counts snapshot
///
/// Every variant except [`SnapshotError::Io`] means the file is corrupt.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// File is too small to be a valid snapshot
    #[error("Snapshot file too small: {size} bytes")]
    FileTooSmall {
        /// Actual file size
        size: u64,
    },
    /// Header failed validation
    #[error("Invalid snapshot header: {0}")]
    Header(#[from] SnapshotHeaderError),
    /// Entry count in the header implies a size past u64
    #[error("Snapshot entry count {entry_count} is out of range")]
    EntryCountOverflow {
        /// Entry count read from the header
        entry_count: u64,
    },
    /// File size does not match the entry count in the header
    #[error("Snapshot size mismatch: header implies {expected} bytes, file has {actual}")]
    SizeMismatch {
        /// Size implied by the header
        expected: u64,
        /// Actual file size
        actual: u64,
    },
    /// Trailer magic missing
    #[error("Invalid trailer magic: {actual:?}")]
    TrailerMismatch {
        /// Bytes found where the trailer magic belongs
        actual: [u8; 4],
    },
    /// CRC mismatch
    #[error("CRC mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    CrcMismatch {
        /// Stored CRC
        stored: u32,
        /// Computed CRC
        computed: u32,
    },
    /// Entries out of order or duplicated
    #[error("Entry {index} ({key}) is not strictly greater than its predecessor ({previous})")]
    UnsortedEntries {
        /// Position of the offending entry
        index: u64,
        /// Offending key
        key: CountsKey,
        /// Preceding key
        previous: CountsKey,
    },
    /// An entry's key failed to decode
    #[error("Corrupt key in entry {index}: {source}")]
    CorruptKey {
        /// Position of the offending entry
        index: u64,
        /// Decode failure
        source: CorruptKeyError,
    },
    /// Entry count given to the writer did not match what it produced
    #[error("Entry count mismatch: declared {declared}, written {written}")]
    CountMismatch {
        /// Count the iterator declared
        declared: u64,
        /// Entries actually produced
        written: u64,
    },
    /// Writer was handed entries that are not strictly ascending
    #[error("Entries handed to the writer are not strictly ascending: {key} after {previous}")]
    UnsortedInput {
        /// Offending key
        key: CountsKey,
        /// Preceding key
        previous: CountsKey,
    },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    /// True if the error indicates on-disk corruption rather than an I/O failure
    pub fn is_corruption(&self) -> bool {
        !matches!(
            self,
            SnapshotError::Io(_)
                | SnapshotError::CountMismatch { .. }
                | SnapshotError::UnsortedInput { .. }
        )
    }
}

impl From<SnapshotError> for countsdb_core::Error {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::Io(io) => countsdb_core::Error::Io(io),
            SnapshotError::CorruptKey { source, .. } => countsdb_core::Error::CorruptKey(source),
            SnapshotError::CountMismatch { .. } | SnapshotError::UnsortedInput { .. } => {
                countsdb_core::Error::InvalidInput(e.to_string())
            }
            other => countsdb_core::Error::CorruptFile(other.to_string()),
        }
    }
}
