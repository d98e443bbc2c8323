//! Pending counter deltas
//!
//! Deltas applied since the last rotation live here until a rotation makes
//! them durable. Two views of the same data are kept:
//!
//! - `combined`: per-key sum of every closed delta, for point lookups
//! - `journal`: per-transaction delta lists, so a rotation can take exactly
//!   the transactions up to its target
//!
//! ## Updater protocol
//!
//! ```text
//! begin(tx)      -> tracker.open(tx), deltas buffered locally in the Updater
//! increment(..)  -> local only, invisible to readers
//! close()        -> merge into combined, append to journal, tracker.close(tx)
//! drop w/o close -> deltas discarded, tracker.abandon(tx)
//! ```
//!
//! Closing merges into the journal before the tracker marks the id closed.
//! A rotation that has waited for the high-water mark therefore always finds
//! every transaction up to its target in the journal.
//!
//! ## Rotation protocol
//!
//! [`PendingDeltas::drain_up_to`] sums, without removing, the journal entries
//! in `(after, target]` plus all non-transactional batches closed so far. The
//! buffer is untouched until [`PendingDeltas::complete_drain`], which the
//! engine calls under its publication lock together with the snapshot swap.
//! A rotation that fails between the two leaves the buffer exactly as it was.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use countsdb_core::{CounterPair, CountsKey, TxId};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::tracker::{Admission, TxTracker};

/// Buffered value of one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferedCount {
    /// Sum of closed deltas not yet rotated
    pub pair: CounterPair,
    /// Highest transaction id that contributed to `pair`
    pub last_tx: TxId,
}

#[derive(Debug, Default)]
struct Journal {
    by_tx: BTreeMap<TxId, Vec<(CountsKey, CounterPair)>>,
    untracked: VecDeque<Vec<(CountsKey, CounterPair)>>,
}

/// Sorted deltas selected for one rotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainedDeltas {
    /// Transactions in `(after, target]` were taken
    pub after: TxId,
    /// Upper bound of the drained range
    pub target: TxId,
    /// Summed deltas in key order
    pub deltas: BTreeMap<CountsKey, CounterPair>,
    /// Transactions that contributed
    pub transactions: usize,
    /// Non-transactional batches that contributed
    pub untracked_batches: usize,
}

impl DrainedDeltas {
    /// True when nothing was recorded in the drained range
    pub fn is_empty(&self) -> bool {
        self.transactions == 0 && self.untracked_batches == 0
    }

    /// True when only non-transactional batches were drained
    pub fn untracked_only(&self) -> bool {
        self.transactions == 0 && self.untracked_batches > 0
    }
}

/// Shared buffer of closed, unrotated deltas
#[derive(Debug)]
pub struct PendingDeltas {
    combined: DashMap<CountsKey, BufferedCount>,
    journal: Mutex<Journal>,
    tracker: Arc<TxTracker>,
}

impl PendingDeltas {
    /// Create an empty buffer driven by `tracker`
    pub fn new(tracker: Arc<TxTracker>) -> Self {
        PendingDeltas {
            combined: DashMap::new(),
            journal: Mutex::new(Journal::default()),
            tracker,
        }
    }

    /// Tracker deciding which transaction ids may apply
    pub fn tracker(&self) -> &Arc<TxTracker> {
        &self.tracker
    }

    /// Start applying a transaction's deltas
    ///
    /// Stale and duplicate ids get an inert updater whose deltas are dropped.
    pub fn begin(&self, tx_id: TxId) -> Updater<'_> {
        let target = match self.tracker.open(tx_id) {
            Admission::Admitted => Target::Transaction(tx_id),
            Admission::Stale { high_water } => {
                warn!(
                    target: "countsdb::buffer",
                    tx_id,
                    high_water,
                    "Ignoring stale transaction replay"
                );
                Target::Inert(tx_id)
            }
            Admission::Duplicate => {
                debug!(target: "countsdb::buffer", tx_id, "Ignoring duplicate apply");
                Target::Inert(tx_id)
            }
        };
        Updater::new(self, target)
    }

    /// Start a non-transactional update (index statistics maintenance)
    pub fn begin_untracked(&self) -> Updater<'_> {
        Updater::new(self, Target::Untracked)
    }

    /// Buffered value of a key, if any
    pub fn get(&self, key: &CountsKey) -> Option<BufferedCount> {
        self.combined.get(key).map(|entry| *entry)
    }

    /// Buffered delta of a key, zero if none
    pub fn pending(&self, key: &CountsKey) -> CounterPair {
        self.get(key).map(|b| b.pair).unwrap_or_default()
    }

    /// Copy of every buffered key in key order
    pub fn sorted(&self) -> BTreeMap<CountsKey, CounterPair> {
        self.combined
            .iter()
            .map(|entry| (*entry.key(), entry.value().pair))
            .collect()
    }

    /// Number of buffered keys
    pub fn len(&self) -> usize {
        self.combined.len()
    }

    /// True when no key is buffered
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// Transactions closed but not yet rotated
    pub fn pending_transactions(&self) -> usize {
        self.journal.lock().by_tx.len()
    }

    /// Non-transactional batches closed but not yet rotated
    pub fn pending_untracked(&self) -> usize {
        self.journal.lock().untracked.len()
    }

    /// Sum the deltas a rotation from `after` to `target` must write
    ///
    /// Nothing is removed; see [`PendingDeltas::complete_drain`].
    pub fn drain_up_to(&self, after: TxId, target: TxId) -> DrainedDeltas {
        let journal = self.journal.lock();
        let mut drained = DrainedDeltas {
            after,
            target,
            ..DrainedDeltas::default()
        };
        if target > after {
            for batch in journal.by_tx.range(after + 1..=target).map(|(_, b)| b) {
                sum_into(&mut drained.deltas, batch);
                drained.transactions += 1;
            }
        }
        for batch in &journal.untracked {
            sum_into(&mut drained.deltas, batch);
        }
        drained.untracked_batches = journal.untracked.len();
        drained
    }

    /// Forget deltas that are now part of a published snapshot
    pub fn complete_drain(&self, drained: &DrainedDeltas) {
        {
            let mut journal = self.journal.lock();
            let keep = journal.by_tx.split_off(&drained.target.saturating_add(1));
            journal.by_tx = keep;
            let n = drained.untracked_batches.min(journal.untracked.len());
            journal.untracked.drain(..n);
        }
        for (key, delta) in &drained.deltas {
            if let Some(mut entry) = self.combined.get_mut(key) {
                entry.pair -= *delta;
            }
            self.combined.remove_if(key, |_, b| b.pair.is_zero());
        }
        debug!(
            target: "countsdb::buffer",
            target_tx = drained.target,
            keys = drained.deltas.len(),
            remaining = self.combined.len(),
            "Drained deltas retired"
        );
    }

    fn merge(&self, tx_id: Option<TxId>, deltas: &[(CountsKey, CounterPair)]) {
        for (key, delta) in deltas {
            let mut entry = self.combined.entry(*key).or_default();
            entry.pair += *delta;
            if let Some(tx) = tx_id {
                entry.last_tx = entry.last_tx.max(tx);
            }
        }
    }
}

fn sum_into(into: &mut BTreeMap<CountsKey, CounterPair>, batch: &[(CountsKey, CounterPair)]) {
    for (key, delta) in batch {
        *into.entry(*key).or_default() += *delta;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Transaction(TxId),
    Untracked,
    Inert(TxId),
}

/// Scoped handle collecting one transaction's counter deltas
///
/// Deltas become visible only on [`Updater::close`]. Dropping an updater
/// without closing it abandons the deltas.
#[derive(Debug)]
pub struct Updater<'a> {
    buffer: &'a PendingDeltas,
    target: Target,
    deltas: FxHashMap<CountsKey, CounterPair>,
    closed: bool,
}

impl<'a> Updater<'a> {
    fn new(buffer: &'a PendingDeltas, target: Target) -> Self {
        Updater {
            buffer,
            target,
            deltas: FxHashMap::default(),
            closed: false,
        }
    }

    /// Transaction this updater applies, None for non-transactional updates
    pub fn tx_id(&self) -> Option<TxId> {
        match self.target {
            Target::Transaction(tx) | Target::Inert(tx) => Some(tx),
            Target::Untracked => None,
        }
    }

    /// True if deltas will be dropped (stale or duplicate id)
    pub fn is_inert(&self) -> bool {
        matches!(self.target, Target::Inert(_))
    }

    /// Add a delta to any key
    pub fn increment(&mut self, key: CountsKey, first: i64, second: i64) {
        if self.is_inert() {
            return;
        }
        self.deltas
            .entry(key)
            .or_default()
            .add_delta(CounterPair::new(first, second));
    }

    /// Adjust the number of nodes with a label
    pub fn increment_node_count(&mut self, label_id: i32, delta: i64) {
        self.increment(CountsKey::node(label_id), 0, delta);
    }

    /// Adjust the number of relationships matching a pattern
    pub fn increment_relationship_count(
        &mut self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
        delta: i64,
    ) {
        self.increment(
            CountsKey::relationship(start_label_id, type_id, end_label_id),
            0,
            delta,
        );
    }

    /// Adjust the update counter of an index
    pub fn increment_index_updates(&mut self, index_id: i64, delta: i64) {
        self.increment(CountsKey::index_statistics(index_id), delta, 0);
    }

    /// Adjust an index sample
    pub fn increment_index_sample(&mut self, index_id: i64, unique: i64, size: i64) {
        self.increment(CountsKey::index_sample(index_id), unique, size);
    }

    /// Number of distinct keys touched so far
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// True if nothing was incremented
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Publish the deltas and close the transaction
    pub fn close(mut self) {
        self.closed = true;
        let mut deltas: Vec<_> = self
            .deltas
            .drain()
            .filter(|(_, delta)| !delta.is_zero())
            .collect();
        deltas.sort_unstable_by_key(|(key, _)| *key);

        match self.target {
            Target::Transaction(tx_id) => {
                self.buffer.merge(Some(tx_id), &deltas);
                if !deltas.is_empty() {
                    self.buffer.journal.lock().by_tx.insert(tx_id, deltas);
                }
                self.buffer.tracker.close(tx_id);
            }
            Target::Untracked => {
                if !deltas.is_empty() {
                    self.buffer.merge(None, &deltas);
                    self.buffer.journal.lock().untracked.push_back(deltas);
                }
            }
            Target::Inert(_) => {}
        }
    }
}

impl Drop for Updater<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.target {
            Target::Transaction(tx_id) => {
                warn!(
                    target: "countsdb::buffer",
                    tx_id,
                    keys = self.deltas.len(),
                    "Updater dropped without close, transaction not closed"
                );
                self.buffer.tracker.abandon(tx_id);
            }
            Target::Untracked if !self.deltas.is_empty() => {
                warn!(
                    target: "countsdb::buffer",
                    keys = self.deltas.len(),
                    "Statistics updater dropped without close"
                );
            }
            _ => {}
        }
    }
}
