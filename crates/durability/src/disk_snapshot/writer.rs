//! Crash-safe counts snapshot writer
//!
//! Uses write-fsync-rename pattern for atomic snapshot creation.
//!
//! # Crash Safety
//!
//! The snapshot creation follows this pattern:
//! 1. Write to temporary file (.counts-T-M.tmp)
//! 2. fsync the temporary file
//! 3. Atomic rename to final path (counts-T-M.snap)
//! 4. fsync the parent directory
//!
//! This ensures that either the complete snapshot exists or it doesn't -
//! there's no possibility of a partial snapshot being visible.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use countsdb_core::{CounterPair, CountsKey};
use tracing::debug;

use crate::error::SnapshotError;
use crate::format::{
    encode_entry, encode_footer, now_micros, snapshot_path, temp_path, FileVersion, SnapshotHeader,
};
use crate::testing::{CrashPoint, FaultMode, WriteFault};

/// Snapshot writer with crash-safe semantics
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    prefix: String,
    sync: bool,
    fault: Option<WriteFault>,
}

impl SnapshotWriter {
    /// Create a new snapshot writer
    ///
    /// Creates the snapshot directory if it doesn't exist. With `sync` off the
    /// fsync steps are skipped, which only makes sense for tests and tools.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, sync: bool) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(SnapshotWriter {
            dir,
            prefix: prefix.into(),
            sync,
            fault: None,
        })
    }

    /// Inject a fault into subsequent writes
    pub fn with_fault(mut self, fault: Option<WriteFault>) -> Self {
        self.fault = fault;
        self
    }

    /// Replace the injected fault
    pub fn set_fault(&mut self, fault: Option<WriteFault>) {
        self.fault = fault;
    }

    /// Write a snapshot using crash-safe write pattern
    ///
    /// `entries` must be strictly ascending by key; the writer checks this and
    /// refuses to publish otherwise. On any error the temporary file is removed
    /// (unless an injected power-loss fault says the process died) and nothing
    /// is published.
    ///
    /// Returns the path of the published snapshot.
    pub fn write<I>(&self, version: FileVersion, entries: I) -> Result<PathBuf, SnapshotError>
    where
        I: IntoIterator<Item = (CountsKey, CounterPair)>,
        I::IntoIter: ExactSizeIterator,
    {
        let final_path = snapshot_path(&self.dir, &self.prefix, version);
        let temp_path = temp_path(&self.dir, &self.prefix, version);

        match self.write_temp(&temp_path, version, entries.into_iter()) {
            Ok(()) => {}
            Err(WriteFailure::Crashed(e)) => return Err(e),
            Err(WriteFailure::Failed(e)) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(e);
            }
        }

        // Step 3: Atomic rename
        if let Err(e) = std::fs::rename(&temp_path, &final_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        // Step 4: fsync parent directory
        if self.sync {
            let dir = File::open(&self.dir)?;
            dir.sync_all()?;
        }

        debug!(target: "countsdb::durability", %version, path = %final_path.display(), "Snapshot published");
        Ok(final_path)
    }

    fn check_fault(&self, point: CrashPoint) -> Result<(), WriteFailure> {
        match self.fault {
            Some(fault) if fault.point == point => {
                let err = SnapshotError::Io(fault.to_io_error());
                Err(match fault.mode {
                    FaultMode::PowerLoss => WriteFailure::Crashed(err),
                    FaultMode::IoError => WriteFailure::Failed(err),
                })
            }
            _ => Ok(()),
        }
    }

    fn write_temp<I>(&self, temp_path: &Path, version: FileVersion, entries: I) -> Result<(), WriteFailure>
    where
        I: ExactSizeIterator<Item = (CountsKey, CounterPair)>,
    {
        // Step 1: Write to temporary file
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(temp_path)
            .map_err(|e| WriteFailure::Failed(e.into()))?;
        let mut out = BufWriter::new(file);

        let declared = entries.len() as u64;
        let header = SnapshotHeader::new(version, declared, now_micros());
        let header_bytes = header.to_bytes();
        out.write_all(&header_bytes).map_err(WriteFailure::io)?;

        // Track all bytes for CRC
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);

        self.flush_for_fault(&mut out, CrashPoint::AfterHeader)?;

        let mut previous: Option<CountsKey> = None;
        let mut written = 0u64;
        for (key, pair) in entries {
            if let Some(prev) = previous {
                if key <= prev {
                    return Err(WriteFailure::Failed(SnapshotError::UnsortedInput {
                        key,
                        previous: prev,
                    }));
                }
            }
            let bytes = encode_entry(&key, &pair);
            out.write_all(&bytes).map_err(WriteFailure::io)?;
            hasher.update(&bytes);
            previous = Some(key);
            written += 1;
        }

        if written != declared {
            return Err(WriteFailure::Failed(SnapshotError::CountMismatch {
                declared,
                written,
            }));
        }

        self.flush_for_fault(&mut out, CrashPoint::AfterEntries)?;

        // Write footer CRC32 + trailer
        out.write_all(&encode_footer(hasher.finalize()))
            .map_err(WriteFailure::io)?;

        // Step 2: fsync the file
        let file = out
            .into_inner()
            .map_err(|e| WriteFailure::Failed(e.into_error().into()))?;
        if self.sync {
            file.sync_all().map_err(WriteFailure::io)?;
        }
        drop(file);

        self.check_fault(CrashPoint::BeforeRename)
    }

    /// Push buffered bytes to the file before firing a fault, so a simulated
    /// crash leaves exactly what was written so far on disk.
    fn flush_for_fault(
        &self,
        out: &mut BufWriter<File>,
        point: CrashPoint,
    ) -> Result<(), WriteFailure> {
        if matches!(self.fault, Some(fault) if fault.point == point) {
            out.flush().map_err(WriteFailure::io)?;
        }
        self.check_fault(point)
    }

    /// Clean up incomplete temporary files
    ///
    /// This should be called during recovery to remove any
    /// temporary snapshot files left behind by crashes.
    pub fn cleanup_temp_files(&self) -> std::io::Result<usize> {
        let temps = crate::format::list_temp_files(&self.dir, &self.prefix)?;
        let count = temps.len();
        for path in temps {
            std::fs::remove_file(path)?;
        }
        Ok(count)
    }

    /// Check if a temporary file exists for a given version
    pub fn temp_file_exists(&self, version: FileVersion) -> bool {
        temp_path(&self.dir, &self.prefix, version).exists()
    }
}

enum WriteFailure {
    /// Simulated crash: leave everything as is
    Crashed(SnapshotError),
    /// Ordinary failure: caller cleans up
    Failed(SnapshotError),
}

impl WriteFailure {
    fn io(e: std::io::Error) -> Self {
        WriteFailure::Failed(SnapshotError::Io(e))
    }
}
