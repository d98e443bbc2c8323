//! Counts snapshot header and file versions
//!
//! Every counts snapshot starts with a 64-byte header:
//!
//! ```text
//! +------------------+ 0
//! | magic "CNTS"     | 4 bytes
//! | format_version   | u32
//! | last_tx_id       | u64
//! | minor_version    | u64
//! | entry_count      | u64
//! | created_at       | u64 (microseconds since epoch)
//! | reserved         | 24 bytes
//! +------------------+ 64
//! ```
//!
//! Header integers are little-endian.

use std::fmt;

use countsdb_core::TxId;

/// Magic bytes: "CNTS"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"CNTS";

/// Snapshot format version for forward compatibility
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot header size in bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 64;

/// Version of a snapshot file
///
/// Ordered by transaction id, then by minor version. The minor version
/// distinguishes snapshots that share a transaction id, which happens when
/// changes that are not tied to a transaction get rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileVersion {
    /// Last transaction included in the snapshot
    pub tx_id: TxId,
    /// Tiebreaker among snapshots with the same `tx_id`
    pub minor: u64,
}

impl FileVersion {
    /// Create a version
    pub const fn new(tx_id: TxId, minor: u64) -> Self {
        FileVersion { tx_id, minor }
    }

    /// Version of the next rotation to `target`
    ///
    /// Rotating to the current transaction id bumps the minor version;
    /// rotating forward resets it.
    pub fn next_for(&self, target: TxId) -> FileVersion {
        if target == self.tx_id {
            FileVersion::new(self.tx_id, self.minor + 1)
        } else {
            FileVersion::new(target, 0)
        }
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tx_id, self.minor)
    }
}

/// Counts snapshot header (64 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes: "CNTS"
    pub magic: [u8; 4],
    /// Format version for forward compatibility
    pub format_version: u32,
    /// Last transaction whose deltas are included
    pub last_tx_id: TxId,
    /// Minor rotation version
    pub minor_version: u64,
    /// Number of entries following the header
    pub entry_count: u64,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Reserved for future use
    pub reserved: [u8; 24],
}

impl SnapshotHeader {
    /// Create a new snapshot header
    pub fn new(version: FileVersion, entry_count: u64, created_at: u64) -> Self {
        SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            format_version: SNAPSHOT_FORMAT_VERSION,
            last_tx_id: version.tx_id,
            minor_version: version.minor,
            entry_count,
            created_at,
            reserved: [0u8; 24],
        }
    }

    /// Version of the file this header belongs to
    pub fn version(&self) -> FileVersion {
        FileVersion::new(self.last_tx_id, self.minor_version)
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.last_tx_id.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.minor_version.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.entry_count.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.created_at.to_le_bytes());
        bytes[40..64].copy_from_slice(&self.reserved);
        bytes
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; SNAPSHOT_HEADER_SIZE]) -> Option<Self> {
        Some(SnapshotHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            last_tx_id: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            minor_version: u64::from_le_bytes(bytes[16..24].try_into().ok()?),
            entry_count: u64::from_le_bytes(bytes[24..32].try_into().ok()?),
            created_at: u64::from_le_bytes(bytes[32..40].try_into().ok()?),
            reserved: bytes[40..64].try_into().ok()?,
        })
    }

    /// Validate the header
    pub fn validate(&self) -> Result<(), SnapshotHeaderError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotHeaderError::InvalidMagic {
                expected: SNAPSHOT_MAGIC,
                actual: self.magic,
            });
        }
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotHeaderError::UnsupportedVersion {
                version: self.format_version,
                max_supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when validating a snapshot header
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotHeaderError {
    /// Invalid magic bytes
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 4],
        /// Actual magic bytes found
        actual: [u8; 4],
    },
    /// Unsupported format version
    #[error("Unsupported snapshot version {version}, max supported is {max_supported}")]
    UnsupportedVersion {
        /// Version found in the file
        version: u32,
        /// Maximum supported version
        max_supported: u32,
    },
}

/// Current time in microseconds since the epoch
///
/// Falls back to 0 if the system clock is before the epoch.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_header_roundtrip() {
        let header = SnapshotHeader::new(FileVersion::new(100, 2), 7, 1234567890);

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"CNTS");

        let parsed = SnapshotHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.version(), FileVersion::new(100, 2));
    }

    #[test]
    fn test_snapshot_header_validation() {
        let header = SnapshotHeader::new(FileVersion::new(1, 0), 0, 0);
        assert!(header.validate().is_ok());

        let mut bad_header = header.clone();
        bad_header.magic = *b"BADM";
        assert!(matches!(
            bad_header.validate(),
            Err(SnapshotHeaderError::InvalidMagic { .. })
        ));

        let mut future_header = header;
        future_header.format_version = 999;
        assert!(matches!(
            future_header.validate(),
            Err(SnapshotHeaderError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_version_order_tx_first_then_minor() {
        assert!(FileVersion::new(5, 9) < FileVersion::new(6, 0));
        assert!(FileVersion::new(6, 0) < FileVersion::new(6, 1));
        assert_eq!(FileVersion::new(3, 3), FileVersion::new(3, 3));
    }

    #[test]
    fn test_next_version() {
        let v = FileVersion::new(10, 0);
        assert_eq!(v.next_for(10), FileVersion::new(10, 1));
        assert_eq!(v.next_for(10).next_for(10), FileVersion::new(10, 2));
        assert_eq!(FileVersion::new(10, 2).next_for(12), FileVersion::new(12, 0));
    }
}
