//! Counts store
//!
//! [`CountsStore`] ties the layers together:
//!
//! ```text
//!             apply(tx) -> Updater ──close──> PendingDeltas ──┐
//!                                                            ├── lookup = snapshot + pending
//!   RwLock<Arc<SnapshotFile>>  (published snapshot) ─────────┘
//!             ^
//!             └── rotate(target): wait, drain, merge, write, swap
//! ```
//!
//! The published snapshot is the only shared pointer that changes. Readers
//! hold its read lock while combining the snapshot value with the pending
//! delta, and rotation swaps it and retires the drained deltas under the
//! write lock, so a reader sees either the old snapshot with the old deltas or
//! the new snapshot with what remains. Appliers never touch the lock and never
//! block on rotation.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use countsdb_concurrency::{PendingDeltas, TxTracker, Updater, VersionContext};
use countsdb_core::{
    CounterPair, CountsDeltaBatch, CountsKey, CountsVisitor, Error, Result, TxId, BASE_TX_ID,
};
use countsdb_durability::{
    list_quarantined, CacheStats, FileVersion, PageCache, RecoveryCoordinator, RecoveryReport,
    RecoveryResult, SnapshotFile, SnapshotWriter, WriteFault,
};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use crate::builder::{rebuild, CountsBuilder};
use crate::config::CountsConfig;
use crate::rotation::{merge_entries, RotationState, RotationStats};

/// Crash-safe transactional counts store
pub struct CountsStore {
    pub(crate) config: CountsConfig,
    pub(crate) cache: Arc<PageCache>,
    pub(crate) writer: Mutex<SnapshotWriter>,
    pub(crate) current: RwLock<Arc<SnapshotFile>>,
    pub(crate) buffer: PendingDeltas,
    pub(crate) rotation_lock: Mutex<()>,
    pub(crate) state: AtomicU8,
    pub(crate) stats: RotationStats,
    recovery_report: RecoveryReport,
}

impl CountsStore {
    /// Open a store, starting empty at transaction 0 in a fresh directory
    ///
    /// # Errors
    ///
    /// `CorruptFile` if no valid snapshot is left but quarantined ones exist.
    /// The counts they held are gone; reopen with [`Self::open_with_builder`].
    pub fn open(config: CountsConfig) -> Result<Self> {
        Self::open_inner(config, None)
    }

    /// Open a store, rebuilding from `builder` if no valid snapshot exists
    pub fn open_with_builder(config: CountsConfig, builder: &dyn CountsBuilder) -> Result<Self> {
        Self::open_inner(config, Some(builder))
    }

    fn open_inner(config: CountsConfig, builder: Option<&dyn CountsBuilder>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(PageCache::new(config.page_cache_pages));
        let writer = SnapshotWriter::new(
            &config.directory,
            config.file_prefix.as_str(),
            config.sync_on_rotate,
        )?;

        let RecoveryResult { snapshot, report } =
            RecoveryCoordinator::new(&config.directory, config.file_prefix.as_str(), Arc::clone(&cache))
                .recover()?;

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                let (version, entries) = match builder {
                    Some(builder) => rebuild(builder),
                    None => {
                        let quarantined =
                            list_quarantined(&config.directory, config.file_prefix.as_str())?;
                        if let Some((newest, _)) = quarantined.last() {
                            error!(
                                target: "countsdb::recovery",
                                dir = %config.directory.display(),
                                quarantined = quarantined.len(),
                                %newest,
                                "No valid counts snapshot left, rebuild required"
                            );
                            return Err(Error::CorruptFile(format!(
                                "no valid counts snapshot in {}, {} quarantined (newest {}); \
                                 rebuild with a builder",
                                config.directory.display(),
                                quarantined.len(),
                                newest
                            )));
                        }
                        (FileVersion::new(BASE_TX_ID, 0), Vec::new())
                    }
                };
                let path = writer.write(version, entries)?;
                info!(
                    target: "countsdb::recovery",
                    %version,
                    rebuilt = builder.is_some(),
                    "Created initial counts snapshot"
                );
                SnapshotFile::open(&path, Arc::clone(&cache))?
            }
        };

        info!(
            target: "countsdb::recovery",
            dir = %config.directory.display(),
            version = %snapshot.version(),
            entries = snapshot.entry_count(),
            "Counts store opened"
        );

        let tracker = Arc::new(TxTracker::new(snapshot.version().tx_id));
        Ok(CountsStore {
            cache,
            writer: Mutex::new(writer),
            current: RwLock::new(Arc::new(snapshot)),
            buffer: PendingDeltas::new(tracker),
            rotation_lock: Mutex::new(()),
            state: AtomicU8::new(RotationState::Idle as u8),
            stats: RotationStats::default(),
            recovery_report: report,
            config,
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Start applying the counter deltas of transaction `tx_id`
    ///
    /// Stale or duplicate ids yield an inert updater. The deltas become visible
    /// when the updater is closed.
    pub fn apply(&self, tx_id: TxId) -> Updater<'_> {
        self.buffer.begin(tx_id)
    }

    /// Apply a whole batch; false if it was ignored as stale or duplicate
    pub fn apply_transaction(&self, batch: &CountsDeltaBatch) -> bool {
        let mut updater = self.apply(batch.tx_id);
        if updater.is_inert() {
            return false;
        }
        for (key, delta) in &batch.deltas {
            updater.increment(*key, delta.first, delta.second);
        }
        updater.close();
        true
    }

    /// Updater for index statistics, not bound to a transaction
    ///
    /// Its deltas are included in the next rotation whatever its target.
    pub fn stats_updater(&self) -> Updater<'_> {
        self.buffer.begin_untracked()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current value of a key: snapshot value plus pending deltas
    pub fn lookup(&self, key: &CountsKey) -> Result<CounterPair> {
        let current = self.current.read();
        let base = current.lookup(key)?.unwrap_or_default();
        Ok(base + self.buffer.pending(key))
    }

    /// Lookup that records possible dirty reads in `ctx`
    pub fn lookup_in(&self, key: &CountsKey, ctx: &mut VersionContext) -> Result<CounterPair> {
        let current = self.current.read();
        ctx.observe(current.version().tx_id);
        let base = current.lookup(key)?.unwrap_or_default();
        let pending = match self.buffer.get(key) {
            Some(buffered) => {
                ctx.observe(buffered.last_tx);
                buffered.pair
            }
            None => CounterPair::ZERO,
        };
        Ok(base + pending)
    }

    /// Context for a read starting now
    pub fn begin_read(&self) -> VersionContext {
        let mut ctx = VersionContext::new();
        ctx.init_read(&**self.buffer.tracker());
        ctx
    }

    /// Context for reads made by committing transaction `tx_id`
    pub fn begin_write(&self, tx_id: TxId) -> VersionContext {
        let mut ctx = VersionContext::new();
        ctx.init_write(&**self.buffer.tracker(), tx_id);
        ctx
    }

    /// Number of nodes with a label
    pub fn node_count(&self, label_id: i32) -> Result<i64> {
        Ok(self.lookup(&CountsKey::node(label_id))?.second)
    }

    /// Number of relationships matching a pattern
    pub fn relationship_count(&self, start_label_id: i32, type_id: i32, end_label_id: i32) -> Result<i64> {
        Ok(self
            .lookup(&CountsKey::relationship(start_label_id, type_id, end_label_id))?
            .second)
    }

    /// `{updates, size}` of an index
    pub fn index_statistics(&self, index_id: i64) -> Result<CounterPair> {
        self.lookup(&CountsKey::index_statistics(index_id))
    }

    /// `{unique, size}` of an index
    pub fn index_sample(&self, index_id: i64) -> Result<CounterPair> {
        self.lookup(&CountsKey::index_sample(index_id))
    }

    /// Visit every non-zero counter of the current state in key order
    pub fn visit_all(&self, visitor: &mut dyn CountsVisitor) -> Result<()> {
        let merged = {
            let current = self.current.read();
            let pending = self.buffer.sorted();
            merge_entries(current.entries(), &pending)?
        };
        for (key, pair) in merged {
            key.accept(visitor, pair);
        }
        Ok(())
    }

    // ========================================================================
    // Versions
    // ========================================================================

    /// Transaction id reflected by the published snapshot
    pub fn current_transaction_id(&self) -> TxId {
        self.current.read().version().tx_id
    }

    /// Version of the published snapshot
    pub fn current_version(&self) -> FileVersion {
        self.current.read().version()
    }

    /// Highest id below which every transaction has closed
    pub fn last_closed_transaction_id(&self) -> TxId {
        self.buffer.tracker().high_water()
    }

    // ========================================================================
    // Resources and diagnostics
    // ========================================================================

    /// Resize the page cache (resource-pressure signal from the host)
    pub fn set_cache_capacity(&self, pages: usize) {
        self.cache.set_capacity(pages);
    }

    /// Page cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Store directory
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Path of the published snapshot file
    pub fn current_path(&self) -> PathBuf {
        self.current.read().path().to_path_buf()
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &CountsConfig {
        &self.config
    }

    /// What snapshot recovery did on open
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery_report
    }

    /// Keys with pending deltas
    pub fn pending_keys(&self) -> usize {
        self.buffer.len()
    }

    /// Make subsequent snapshot writes fail at a chosen point
    #[doc(hidden)]
    pub fn inject_write_fault(&self, fault: Option<WriteFault>) {
        self.writer.lock().set_fault(fault);
    }
}

impl std::fmt::Debug for CountsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountsStore")
            .field("directory", &self.config.directory)
            .field("version", &self.current_version())
            .field("last_closed", &self.last_closed_transaction_id())
            .field("pending_keys", &self.buffer.len())
            .field("rotation_state", &self.rotation_state())
            .finish()
    }
}
