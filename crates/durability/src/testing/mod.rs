//! Testing utilities for counts snapshots
//!
//! - **Crash injection**: stop a snapshot write at a chosen point, either
//!   leaving the temp file behind (power loss) or failing like a real I/O
//!   error (temp file cleaned up)
//! - **Corruption helpers**: flip bytes, truncate files and rewrite the
//!   header's entry count
//!
//! # Example
//!
//! ```ignore
//! use countsdb_durability::testing::{CrashPoint, WriteFault};
//!
//! let writer = SnapshotWriter::new(dir, "counts", true)?
//!     .with_fault(Some(WriteFault::crash(CrashPoint::BeforeRename)));
//! ```

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::format::{SnapshotHeader, SNAPSHOT_HEADER_SIZE};

/// Point in the snapshot write sequence where a fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Header written, no entries yet
    AfterHeader,
    /// Entries written, footer missing
    AfterEntries,
    /// Complete temp file synced, not yet renamed into place
    BeforeRename,
}

impl CrashPoint {
    /// Get all crash points
    pub fn all() -> Vec<CrashPoint> {
        vec![
            CrashPoint::AfterHeader,
            CrashPoint::AfterEntries,
            CrashPoint::BeforeRename,
        ]
    }

    /// Get description of crash point
    pub fn description(&self) -> &'static str {
        match self {
            CrashPoint::AfterHeader => "after header, before entries",
            CrashPoint::AfterEntries => "after entries, before footer",
            CrashPoint::BeforeRename => "after fsync, before rename",
        }
    }
}

/// How an injected fault behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultMode {
    /// Process dies: no cleanup, temp file stays on disk
    PowerLoss,
    /// Write fails: normal error handling removes the temp file
    IoError,
}

/// Fault injected into a snapshot write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteFault {
    /// Where the fault fires
    pub point: CrashPoint,
    /// What the fault looks like
    pub mode: FaultMode,
}

impl WriteFault {
    /// Simulated power loss at `point`
    pub fn crash(point: CrashPoint) -> Self {
        WriteFault {
            point,
            mode: FaultMode::PowerLoss,
        }
    }

    /// Simulated I/O error at `point`
    pub fn io_error(point: CrashPoint) -> Self {
        WriteFault {
            point,
            mode: FaultMode::IoError,
        }
    }

    pub(crate) fn to_io_error(self) -> io::Error {
        io::Error::new(
            io::ErrorKind::Other,
            format!("injected fault {}", self.point.description()),
        )
    }
}

/// XOR one byte of a file with 0xFF
pub fn corrupt_byte(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Truncate a file to `len` bytes
pub fn truncate(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()
}

/// Rewrite the entry count in a snapshot header, leaving everything else as is
pub fn overwrite_entry_count(path: &Path, entry_count: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut bytes = [0u8; SNAPSHOT_HEADER_SIZE];
    file.read_exact(&mut bytes)?;
    let mut header = SnapshotHeader::from_bytes(&bytes)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short header"))?;
    header.entry_count = entry_count;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.to_bytes())?;
    file.sync_all()
}
