//! Log recovery
//!
//! On startup the surrounding engine replays its transaction log through
//! [`CountsStore::recover_from_log`]. Batches already contained in the
//! published snapshot are skipped; everything newer is applied exactly once.
//!
//! Replay is idempotent: a second replay of the same log finds every id
//! already closed and applies nothing.

use countsdb_core::CountsDeltaBatch;
use tracing::{debug, info};

use crate::store::CountsStore;

/// Result of a log replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Batches applied to the store
    pub applied: u64,
    /// Batches skipped as already durable or already applied
    pub skipped: u64,
}

impl CountsStore {
    /// Re-apply logged batches newer than the published snapshot
    pub fn recover_from_log<I>(&self, batches: I) -> RecoveryStats
    where
        I: IntoIterator<Item = CountsDeltaBatch>,
    {
        let durable = self.current_transaction_id();
        let mut stats = RecoveryStats::default();

        for batch in batches {
            if batch.tx_id <= durable {
                stats.skipped += 1;
                continue;
            }
            if self.buffer.tracker().is_closed(batch.tx_id) || !self.apply_transaction(&batch) {
                debug!(target: "countsdb::recovery", tx_id = batch.tx_id, "Batch already applied");
                stats.skipped += 1;
                continue;
            }
            stats.applied += 1;
        }

        info!(
            target: "countsdb::recovery",
            durable_tx = durable,
            applied = stats.applied,
            skipped = stats.skipped,
            last_closed = self.last_closed_transaction_id(),
            "Log recovery complete"
        );
        stats
    }
}
