//! Recovery coordinator
//!
//! Determines the current counts snapshot purely from on-disk state.
//!
//! Recovery algorithm:
//! 1. Remove leftover temporary files (interrupted rotations)
//! 2. Open and validate every published snapshot
//! 3. Quarantine files that fail validation (rename with `.corrupt`)
//! 4. Select the highest valid (tx id, minor version)
//! 5. Remove older valid snapshots
//!
//! # Recovery Properties
//!
//! - **Deterministic**: Same directory contents -> same selection
//! - **Idempotent**: Running recovery again selects the same file
//! - **Never invents data**: only fully validated files are selected
//!
//! # Example
//!
//! ```ignore
//! let recovery = RecoveryCoordinator::new(dir, "counts", cache);
//! let result = recovery.recover()?;
//! if let Some(snapshot) = result.snapshot { /* current state */ }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::disk_snapshot::{PageCache, SnapshotFile};
use crate::error::SnapshotError;
use crate::format::{list_snapshots, list_temp_files, FileVersion, CORRUPT_SUFFIX};

/// Recovery coordinator
pub struct RecoveryCoordinator {
    dir: PathBuf,
    prefix: String,
    cache: Arc<PageCache>,
}

impl RecoveryCoordinator {
    /// Create a new recovery coordinator
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, cache: Arc<PageCache>) -> Self {
        RecoveryCoordinator {
            dir: dir.into(),
            prefix: prefix.into(),
            cache,
        }
    }

    /// Get the snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Select the current snapshot, cleaning up everything else
    ///
    /// Only I/O errors from listing or deleting abort recovery; a corrupt
    /// snapshot is quarantined and recovery moves on to the next candidate.
    pub fn recover(&self) -> Result<RecoveryResult, SnapshotError> {
        let mut report = RecoveryReport::default();

        // Step 1: Remove interrupted writes
        for temp in list_temp_files(&self.dir, &self.prefix)? {
            debug!(target: "countsdb::recovery", path = %temp.display(), "Removing temp file");
            std::fs::remove_file(&temp)?;
            report.removed_temp += 1;
        }

        // Steps 2-4: newest first, first valid wins
        let mut candidates = list_snapshots(&self.dir, &self.prefix)?;
        candidates.reverse();

        let mut selected: Option<SnapshotFile> = None;
        for (version, path) in candidates {
            if selected.is_some() {
                // Step 5: older than the selected snapshot
                debug!(target: "countsdb::recovery", %version, "Removing superseded snapshot");
                std::fs::remove_file(&path)?;
                report.removed_stale.push(version);
                continue;
            }
            match SnapshotFile::open(&path, Arc::clone(&self.cache)) {
                Ok(file) if file.version() == version => selected = Some(file),
                Ok(file) => {
                    warn!(
                        target: "countsdb::recovery",
                        name_version = %version,
                        header_version = %file.version(),
                        "Snapshot header disagrees with file name, quarantining"
                    );
                    drop(file);
                    self.quarantine(&path)?;
                    report.quarantined.push(version);
                }
                Err(e) if e.is_corruption() => {
                    warn!(
                        target: "countsdb::recovery",
                        %version,
                        error = %e,
                        "Corrupt snapshot, quarantining"
                    );
                    self.quarantine(&path)?;
                    report.quarantined.push(version);
                }
                Err(e) => return Err(e),
            }
        }

        report.selected = selected.as_ref().map(|s| s.version());
        info!(
            target: "countsdb::recovery",
            selected = ?report.selected,
            quarantined = report.quarantined.len(),
            removed_stale = report.removed_stale.len(),
            removed_temp = report.removed_temp,
            "Snapshot recovery complete"
        );

        Ok(RecoveryResult {
            snapshot: selected,
            report,
        })
    }

    fn quarantine(&self, path: &Path) -> Result<(), SnapshotError> {
        let mut target = path.as_os_str().to_owned();
        target.push(CORRUPT_SUFFIX);
        std::fs::rename(path, PathBuf::from(target))?;
        Ok(())
    }
}

/// What recovery found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Version of the selected snapshot, if any
    pub selected: Option<FileVersion>,
    /// Snapshots that failed validation and were renamed aside
    pub quarantined: Vec<FileVersion>,
    /// Valid but superseded snapshots that were deleted
    pub removed_stale: Vec<FileVersion>,
    /// Leftover temporary files deleted
    pub removed_temp: usize,
}

/// Result of snapshot recovery
#[derive(Debug)]
pub struct RecoveryResult {
    /// The current snapshot, or None for a directory without one
    pub snapshot: Option<SnapshotFile>,
    /// What happened along the way
    pub report: RecoveryReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_snapshot::SnapshotWriter;
    use crate::format::temp_path;
    use crate::testing::corrupt_byte;
    use countsdb_core::{CounterPair, CountsKey};

    fn write(dir: &Path, version: FileVersion, count: i64) -> PathBuf {
        SnapshotWriter::new(dir, "counts", false)
            .unwrap()
            .write(version, vec![(CountsKey::node(1), CounterPair::count(count))])
            .unwrap()
    }

    fn coordinator(dir: &Path) -> RecoveryCoordinator {
        RecoveryCoordinator::new(dir, "counts", Arc::new(PageCache::new(4)))
    }

    #[test]
    fn test_empty_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = coordinator(temp_dir.path()).recover().unwrap();
        assert!(result.snapshot.is_none());
        assert_eq!(result.report, RecoveryReport::default());
    }

    #[test]
    fn test_selects_highest_version() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), FileVersion::new(2, 0), 1);
        write(temp_dir.path(), FileVersion::new(3, 0), 2);
        write(temp_dir.path(), FileVersion::new(3, 1), 3);

        let result = coordinator(temp_dir.path()).recover().unwrap();
        let snapshot = result.snapshot.unwrap();
        assert_eq!(snapshot.version(), FileVersion::new(3, 1));
        assert_eq!(
            snapshot.lookup(&CountsKey::node(1)).unwrap(),
            Some(CounterPair::count(3))
        );
        assert_eq!(
            result.report.removed_stale,
            vec![FileVersion::new(3, 0), FileVersion::new(2, 0)]
        );
        assert_eq!(list_snapshots(temp_dir.path(), "counts").unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_newest_falls_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), FileVersion::new(2, 0), 1);
        let newest = write(temp_dir.path(), FileVersion::new(5, 0), 9);
        corrupt_byte(&newest, 70).unwrap();

        let result = coordinator(temp_dir.path()).recover().unwrap();
        assert_eq!(result.snapshot.unwrap().version(), FileVersion::new(2, 0));
        assert_eq!(result.report.quarantined, vec![FileVersion::new(5, 0)]);
        assert!(!newest.exists());
        let mut quarantined = newest.as_os_str().to_owned();
        quarantined.push(CORRUPT_SUFFIX);
        assert!(PathBuf::from(quarantined).exists());
    }

    #[test]
    fn test_temp_files_removed() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), FileVersion::new(2, 0), 1);
        let temp = temp_path(temp_dir.path(), "counts", FileVersion::new(3, 0));
        std::fs::write(&temp, b"partial").unwrap();

        let result = coordinator(temp_dir.path()).recover().unwrap();
        assert_eq!(result.report.removed_temp, 1);
        assert!(!temp.exists());
        assert_eq!(result.snapshot.unwrap().version(), FileVersion::new(2, 0));
    }

    #[test]
    fn test_name_header_disagreement_quarantined() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), FileVersion::new(1, 0), 1);
        let written = write(temp_dir.path(), FileVersion::new(2, 0), 2);
        let renamed = crate::format::snapshot_path(temp_dir.path(), "counts", FileVersion::new(8, 0));
        std::fs::rename(&written, &renamed).unwrap();

        let result = coordinator(temp_dir.path()).recover().unwrap();
        assert_eq!(result.snapshot.unwrap().version(), FileVersion::new(1, 0));
        assert_eq!(result.report.quarantined, vec![FileVersion::new(8, 0)]);
    }

    #[test]
    fn test_recovery_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), FileVersion::new(4, 0), 1);
        write(temp_dir.path(), FileVersion::new(6, 2), 2);

        let first = coordinator(temp_dir.path()).recover().unwrap();
        let first_version = first.snapshot.as_ref().map(|s| s.version());
        drop(first);
        let second = coordinator(temp_dir.path()).recover().unwrap();
        assert_eq!(second.snapshot.map(|s| s.version()), first_version);
        assert!(second.report.removed_stale.is_empty());
    }
}
