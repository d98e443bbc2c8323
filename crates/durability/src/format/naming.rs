//! Snapshot file naming
//!
//! Snapshots are named `{prefix}-TTTTTTTTTTTTTTTTTTTT-MMMMMMMMMM.snap` where the
//! T digits are the zero-padded last transaction id and the M digits the
//! minor version. Files are written as `.{prefix}-...tmp` and renamed into
//! place, so a name without the leading dot always denotes a complete write.
//! Quarantined files get a `.corrupt` suffix. They are never read again, but
//! their presence tells the store that counts were lost.

use std::path::{Path, PathBuf};

use super::header::FileVersion;

/// Extension of published snapshots
pub const SNAPSHOT_EXTENSION: &str = "snap";

/// Suffix appended to quarantined files
pub const CORRUPT_SUFFIX: &str = ".corrupt";

fn stem(prefix: &str, version: FileVersion) -> String {
    format!("{}-{:020}-{:010}", prefix, version.tx_id, version.minor)
}

/// Path of the published snapshot for `version`
pub fn snapshot_path(dir: &Path, prefix: &str, version: FileVersion) -> PathBuf {
    dir.join(format!("{}.{}", stem(prefix, version), SNAPSHOT_EXTENSION))
}

/// Path of the in-progress temporary file for `version`
pub fn temp_path(dir: &Path, prefix: &str, version: FileVersion) -> PathBuf {
    dir.join(format!(".{}.tmp", stem(prefix, version)))
}

/// Parse `{prefix}-TTTT...-MMMM...` into a version
fn parse_stem(prefix: &str, stem: &str) -> Option<FileVersion> {
    let rest = stem.strip_prefix(prefix)?.strip_prefix('-')?;
    let (tx, minor) = rest.split_once('-')?;
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(tx, 20) || !digits(minor, 10) {
        return None;
    }
    Some(FileVersion::new(tx.parse().ok()?, minor.parse().ok()?))
}

/// Parse the version out of a published snapshot file name
///
/// Returns None if the file name doesn't match the expected format.
pub fn parse_snapshot_name(prefix: &str, file_name: &str) -> Option<FileVersion> {
    let stem = file_name.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
    parse_stem(prefix, stem)
}

/// Parse the version out of a quarantined snapshot file name
pub fn parse_quarantined_name(prefix: &str, file_name: &str) -> Option<FileVersion> {
    parse_snapshot_name(prefix, file_name.strip_suffix(CORRUPT_SUFFIX)?)
}

/// True for leftover temporary files of this prefix
pub fn is_temp_name(prefix: &str, file_name: &str) -> bool {
    file_name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .and_then(|stem| parse_stem(prefix, stem))
        .is_some()
}

fn scan_dir<T>(
    dir: &Path,
    mut select: impl FnMut(&str, PathBuf) -> Option<T>,
) -> std::io::Result<Vec<T>> {
    let mut found = Vec::new();

    if !dir.exists() {
        return Ok(found);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(item) = select(&file_name, entry.path()) {
            found.push(item);
        }
    }

    Ok(found)
}

/// List all published snapshot files in a directory, sorted by version
pub fn list_snapshots(dir: &Path, prefix: &str) -> std::io::Result<Vec<(FileVersion, PathBuf)>> {
    let mut snapshots = scan_dir(dir, |name, path| {
        parse_snapshot_name(prefix, name).map(|version| (version, path))
    })?;
    snapshots.sort_by_key(|(version, _)| *version);
    Ok(snapshots)
}

/// List quarantined snapshot files in a directory, sorted by version
pub fn list_quarantined(dir: &Path, prefix: &str) -> std::io::Result<Vec<(FileVersion, PathBuf)>> {
    let mut quarantined = scan_dir(dir, |name, path| {
        parse_quarantined_name(prefix, name).map(|version| (version, path))
    })?;
    quarantined.sort_by_key(|(version, _)| *version);
    Ok(quarantined)
}

/// List leftover temporary files in a directory
pub fn list_temp_files(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    scan_dir(dir, |name, path| is_temp_name(prefix, name).then_some(path))
}
