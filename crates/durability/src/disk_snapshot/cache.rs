//! Bounded page cache for snapshot lookups
//!
//! Lookups binary-search a snapshot file in pages of [`ENTRIES_PER_PAGE`]
//! decoded entries. The cache is an owned LRU instance: the store creates one,
//! hands it to every snapshot file it opens, and the host resizes it when
//! memory gets tight via [`PageCache::set_capacity`]. There is no global cache
//! and no background sizing thread.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use countsdb_core::{CounterPair, CountsKey};
use lru::LruCache;
use parking_lot::Mutex;

use crate::format::FileVersion;

/// Entries per cached page (4 KiB of records)
pub const ENTRIES_PER_PAGE: usize = 128;

/// Decoded entries of one page
pub type Page = Arc<[(CountsKey, CounterPair)]>;

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that had to read the file
    pub misses: u64,
    /// Pages currently held
    pub pages: usize,
    /// Maximum pages held
    pub capacity: usize,
}

/// LRU of decoded snapshot pages keyed by `(file version, page index)`
///
/// Hit/miss counters use Relaxed ordering; they are observational only.
pub struct PageCache {
    pages: Mutex<LruCache<(FileVersion, u64), Page>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        PageCache {
            pages: Mutex::new(LruCache::new(non_zero(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a page, loading it with `load` on a miss
    ///
    /// The loader runs without the cache lock held, so two threads missing on
    /// the same page may both read it; the second insert wins harmlessly.
    pub fn get_or_load<E>(
        &self,
        version: FileVersion,
        page: u64,
        load: impl FnOnce() -> Result<Page, E>,
    ) -> Result<Page, E> {
        if let Some(found) = self.pages.lock().get(&(version, page)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(found));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = load()?;
        self.pages.lock().put((version, page), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drop every page belonging to a file
    pub fn evict_file(&self, version: FileVersion) {
        let mut pages = self.pages.lock();
        let doomed: Vec<_> = pages
            .iter()
            .filter(|((v, _), _)| *v == version)
            .map(|(k, _)| *k)
            .collect();
        for key in doomed {
            pages.pop(&key);
        }
    }

    /// Resize the cache, evicting least recently used pages if shrinking
    pub fn set_capacity(&self, capacity: usize) {
        self.pages.lock().resize(non_zero(capacity));
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let pages = self.pages.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            pages: pages.len(),
            capacity: pages.cap().get(),
        }
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache").field("stats", &self.stats()).finish()
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN)
}
