//! Counts snapshot reader
//!
//! Opens and validates snapshot files, answers point lookups by binary search
//! over the fixed-width entries, and streams entries in key order.
//!
//! A [`SnapshotFile`] is shared behind an `Arc`. When the store publishes a
//! newer snapshot it calls [`SnapshotFile::retire`] on the old one; the file is
//! deleted only when the last reference is dropped, so readers that picked up
//! the old snapshot before the swap can finish undisturbed.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use countsdb_core::{CounterPair, CountsKey};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::cache::{Page, PageCache, ENTRIES_PER_PAGE};
use crate::error::SnapshotError;
use crate::format::{
    decode_entry, decode_footer, expected_file_size, FileVersion, SnapshotHeader, ENTRY_SIZE,
    FOOTER_SIZE, SNAPSHOT_HEADER_SIZE, TRAILER_MAGIC,
};

/// An open, validated counts snapshot
pub struct SnapshotFile {
    path: PathBuf,
    header: SnapshotHeader,
    file: Mutex<File>,
    cache: Arc<PageCache>,
    retired: AtomicBool,
}

impl SnapshotFile {
    /// Open and fully validate a snapshot
    ///
    /// Checks header, file size against the entry count, trailer magic, CRC,
    /// and that every entry decodes and is strictly greater than the previous.
    pub fn open(path: &Path, cache: Arc<PageCache>) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < (SNAPSHOT_HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(SnapshotError::FileTooSmall { size: file_size });
        }

        let mut reader = BufReader::new(file);

        // Read and validate header
        let mut header_bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = SnapshotHeader::from_bytes(&header_bytes).ok_or(SnapshotError::FileTooSmall {
            size: file_size,
        })?;
        header.validate()?;

        let expected =
            expected_file_size(header.entry_count).ok_or(SnapshotError::EntryCountOverflow {
                entry_count: header.entry_count,
            })?;
        if expected != file_size {
            return Err(SnapshotError::SizeMismatch {
                expected,
                actual: file_size,
            });
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);

        // Stream entries: CRC + order check
        let mut buf = [0u8; ENTRY_SIZE];
        let mut previous: Option<CountsKey> = None;
        for index in 0..header.entry_count {
            reader.read_exact(&mut buf)?;
            hasher.update(&buf);
            let (key, _) =
                decode_entry(&buf).map_err(|source| SnapshotError::CorruptKey { index, source })?;
            if let Some(prev) = previous {
                if key <= prev {
                    return Err(SnapshotError::UnsortedEntries {
                        index,
                        key,
                        previous: prev,
                    });
                }
            }
            previous = Some(key);
        }

        let mut footer = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut footer)?;
        let (stored_crc, trailer) = decode_footer(&footer);
        if trailer != TRAILER_MAGIC {
            return Err(SnapshotError::TrailerMismatch { actual: trailer });
        }
        let computed_crc = hasher.finalize();
        if stored_crc != computed_crc {
            return Err(SnapshotError::CrcMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        Ok(SnapshotFile {
            path: path.to_path_buf(),
            header,
            file: Mutex::new(reader.into_inner()),
            cache,
            retired: AtomicBool::new(false),
        })
    }

    /// Version of this snapshot
    pub fn version(&self) -> FileVersion {
        self.header.version()
    }

    /// Number of entries
    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binary search for a key
    ///
    /// Reads O(log n) pages through the page cache.
    pub fn lookup(&self, key: &CountsKey) -> Result<Option<CounterPair>, SnapshotError> {
        let mut lo = 0u64;
        let mut hi = self.header.entry_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (mid_key, pair) = self.entry_at(mid)?;
            match mid_key.cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(pair)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }

    /// Entry at a position
    pub fn entry_at(&self, index: u64) -> Result<(CountsKey, CounterPair), SnapshotError> {
        if index >= self.header.entry_count {
            return Err(SnapshotError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("entry {} out of range ({})", index, self.header.entry_count),
            )));
        }
        let page_no = index / ENTRIES_PER_PAGE as u64;
        let page = self
            .cache
            .get_or_load(self.version(), page_no, || self.read_page(page_no))?;
        Ok(page[(index % ENTRIES_PER_PAGE as u64) as usize])
    }

    /// Iterate all entries in key order
    ///
    /// The iterator reads pages directly and does not populate the cache.
    pub fn entries(&self) -> SnapshotEntries<'_> {
        SnapshotEntries {
            file: self,
            next: 0,
            page: None,
        }
    }

    /// Mark this snapshot superseded
    ///
    /// The file is deleted once the last reference is dropped.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// True once retired
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn read_page(&self, page_no: u64) -> Result<Page, SnapshotError> {
        let first = page_no * ENTRIES_PER_PAGE as u64;
        let count = (self.header.entry_count - first).min(ENTRIES_PER_PAGE as u64) as usize;
        let mut bytes = vec![0u8; count * ENTRY_SIZE];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(
                SNAPSHOT_HEADER_SIZE as u64 + first * ENTRY_SIZE as u64,
            ))?;
            file.read_exact(&mut bytes)?;
        }
        let mut entries = Vec::with_capacity(count);
        for (i, chunk) in bytes.chunks_exact(ENTRY_SIZE).enumerate() {
            let entry = decode_entry(chunk).map_err(|source| SnapshotError::CorruptKey {
                index: first + i as u64,
                source,
            })?;
            entries.push(entry);
        }
        Ok(Arc::from(entries))
    }
}

impl Drop for SnapshotFile {
    fn drop(&mut self) {
        self.cache.evict_file(self.version());
        if self.is_retired() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(
                    target: "countsdb::durability",
                    version = %self.version(),
                    "Removed retired snapshot"
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    target: "countsdb::durability",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove retired snapshot"
                ),
            }
        }
    }
}

impl std::fmt::Debug for SnapshotFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFile")
            .field("path", &self.path)
            .field("version", &self.version())
            .field("entries", &self.header.entry_count)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Sequential iterator over a snapshot's entries
///
/// Restartable with [`SnapshotEntries::rewind`].
pub struct SnapshotEntries<'a> {
    file: &'a SnapshotFile,
    next: u64,
    page: Option<(u64, Page)>,
}

impl SnapshotEntries<'_> {
    /// Restart from the first entry
    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

impl Iterator for SnapshotEntries<'_> {
    type Item = Result<(CountsKey, CounterPair), SnapshotError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.header.entry_count {
            return None;
        }
        let page_no = self.next / ENTRIES_PER_PAGE as u64;
        let cached = matches!(&self.page, Some((no, _)) if *no == page_no);
        if !cached {
            match self.file.read_page(page_no) {
                Ok(page) => self.page = Some((page_no, page)),
                Err(e) => {
                    self.next = self.file.header.entry_count;
                    return Some(Err(e));
                }
            }
        }
        let entry = self
            .page
            .as_ref()
            .map(|(_, page)| page[(self.next % ENTRIES_PER_PAGE as u64) as usize]);
        self.next += 1;
        entry.map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.file.header.entry_count - self.next.min(self.file.header.entry_count)) as usize;
        (remaining, Some(remaining))
    }
}
