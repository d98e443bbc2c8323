//! Snapshot rotation
//!
//! Rotation publishes a new snapshot containing every delta up to a target
//! transaction id.
//!
//! ## State machine
//!
//! ```text
//! Idle -> WaitingForTargetTx -> Draining -> Writing -> Swapping -> Done
//!                 |                            |
//!                 +--(timeout)--> Aborted <----+--(I/O error)
//! ```
//!
//! ## Steps
//!
//! 1. Take the rotation lock (fail fast with `RotationInProgress`)
//! 2. Wait until every transaction up to the target has closed
//! 3. Sum the pending deltas in `(snapshot tx, target]` without removing them
//! 4. Full outer merge with the current snapshot, write, fsync, rename
//! 5. Under the publication write lock: swap the snapshot, retire the drained
//!    deltas, retire the old file
//!
//! Any failure before step 5 leaves the published snapshot and the pending
//! deltas untouched. The old file is deleted once the last reference to it
//! is dropped, never before the new one is published.
//!
//! # Memory Ordering
//!
//! The [`RotationStats`] counters and the state byte use Relaxed ordering;
//! they are observational only.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use countsdb_concurrency::DrainedDeltas;
use countsdb_core::{CounterPair, CountsKey, Error, Result, TxId};
use countsdb_durability::{FileVersion, SnapshotError, SnapshotFile};
use tracing::{debug, info, warn};

use crate::store::CountsStore;

/// Phase of the current (or last) rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RotationState {
    /// No rotation has run yet
    Idle = 0,
    /// Waiting for transactions up to the target to close
    WaitingForTargetTx = 1,
    /// Selecting pending deltas
    Draining = 2,
    /// Writing the new snapshot file
    Writing = 3,
    /// Publishing the new snapshot
    Swapping = 4,
    /// Last rotation finished (or was a no-op)
    Done = 5,
    /// Last rotation timed out or failed
    Aborted = 6,
}

impl RotationState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RotationState::WaitingForTargetTx,
            2 => RotationState::Draining,
            3 => RotationState::Writing,
            4 => RotationState::Swapping,
            5 => RotationState::Done,
            6 => RotationState::Aborted,
            _ => RotationState::Idle,
        }
    }

    /// True while a rotation is running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RotationState::WaitingForTargetTx
                | RotationState::Draining
                | RotationState::Writing
                | RotationState::Swapping
        )
    }
}

/// Rotation counters
#[derive(Debug, Default)]
pub struct RotationStats {
    completed: AtomicU64,
    no_op: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`RotationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationMetrics {
    /// Rotations that published a new snapshot
    pub completed: u64,
    /// Rotations with nothing to write
    pub no_op: u64,
    /// Rotations that gave up waiting
    pub timed_out: u64,
    /// Rotations that failed on I/O or corruption
    pub failed: u64,
}

impl RotationStats {
    /// Current counter values
    pub fn snapshot(&self) -> RotationMetrics {
        RotationMetrics {
            completed: self.completed.load(Ordering::Relaxed),
            no_op: self.no_op.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Result of a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Version published after the rotation
    pub version: FileVersion,
    /// Version published before the rotation
    pub previous: FileVersion,
    /// Entries in the published snapshot
    pub entries: u64,
    /// False for a no-op rotation
    pub written: bool,
}

impl CountsStore {
    /// Rotate to `target`, returning the published version
    ///
    /// See [`CountsStore::rotate_with_outcome`].
    pub fn rotate(&self, target: TxId) -> Result<FileVersion> {
        Ok(self.rotate_with_outcome(target)?.version)
    }

    /// Publish a snapshot containing every delta up to `target`
    ///
    /// Blocks until all transactions up to `target` have closed, for at most
    /// the configured rotation timeout. A target below the current snapshot,
    /// or a range with no pending deltas, is a no-op returning the current
    /// version.
    ///
    /// # Errors
    ///
    /// - `RotationInProgress` if another rotation holds the lock
    /// - `RotationTimeout` if the wait runs out
    /// - `Io` / `CorruptFile` if writing or re-reading the snapshot fails
    ///
    /// In every error case the store keeps its pre-rotation state.
    pub fn rotate_with_outcome(&self, target: TxId) -> Result<RotationOutcome> {
        let _rotation = self.rotation_lock.try_lock().ok_or(Error::RotationInProgress)?;
        let start = Instant::now();

        self.set_rotation_state(RotationState::WaitingForTargetTx);
        if let Err(timed_out) = self
            .buffer
            .tracker()
            .wait_for(target, self.config.rotation_timeout())
        {
            self.set_rotation_state(RotationState::Aborted);
            self.stats.record(&self.stats.timed_out);
            warn!(
                target: "countsdb::rotation",
                target_tx = target,
                high_water = timed_out.high_water,
                elapsed_ms = timed_out.waited.as_millis() as u64,
                "Rotation timed out waiting for transactions"
            );
            return Err(Error::RotationTimeout {
                target,
                high_water: timed_out.high_water,
                waited: timed_out.waited,
            });
        }

        match self.rotate_closed(target, start) {
            Ok(outcome) => {
                self.set_rotation_state(RotationState::Done);
                Ok(outcome)
            }
            Err(e) => {
                self.set_rotation_state(RotationState::Aborted);
                self.stats.record(&self.stats.failed);
                warn!(
                    target: "countsdb::rotation",
                    target_tx = target,
                    error = %e,
                    "Rotation failed, keeping current snapshot"
                );
                Err(e)
            }
        }
    }

    /// Phase of the current or last rotation
    pub fn rotation_state(&self) -> RotationState {
        RotationState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Rotation counters
    pub fn rotation_stats(&self) -> RotationMetrics {
        self.stats.snapshot()
    }

    fn set_rotation_state(&self, state: RotationState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Steps 3-5, once every transaction up to `target` has closed
    fn rotate_closed(&self, target: TxId, start: Instant) -> Result<RotationOutcome> {
        let current = Arc::clone(&*self.current.read());
        let previous = current.version();

        if target < previous.tx_id {
            return Ok(self.no_op(target, &current, "target below current snapshot"));
        }

        self.set_rotation_state(RotationState::Draining);
        let drained = self.buffer.drain_up_to(previous.tx_id, target);
        if drained.is_empty() {
            return Ok(self.no_op(target, &current, "no pending deltas"));
        }

        self.set_rotation_state(RotationState::Writing);
        let next = self.write_next(&current, &drained)?;
        let version = next.version();
        let entries = next.entry_count();

        self.set_rotation_state(RotationState::Swapping);
        {
            let mut published = self.current.write();
            let old = std::mem::replace(&mut *published, Arc::new(next));
            self.buffer.complete_drain(&drained);
            old.retire();
        }
        drop(current);

        self.stats.record(&self.stats.completed);
        info!(
            target: "countsdb::rotation",
            target_tx = target,
            %previous,
            %version,
            entries,
            transactions = drained.transactions,
            untracked = drained.untracked_batches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rotation complete"
        );

        Ok(RotationOutcome {
            version,
            previous,
            entries,
            written: true,
        })
    }

    fn write_next(&self, current: &SnapshotFile, drained: &DrainedDeltas) -> Result<SnapshotFile> {
        let merged = merge_entries(current.entries(), &drained.deltas)?;
        let version = current.version().next_for(drained.target);
        let path = self.writer.lock().write(version, merged)?;
        match SnapshotFile::open(&path, Arc::clone(&self.cache)) {
            Ok(file) => Ok(file),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e.into())
            }
        }
    }

    fn no_op(&self, target: TxId, current: &SnapshotFile, reason: &'static str) -> RotationOutcome {
        self.stats.record(&self.stats.no_op);
        debug!(
            target: "countsdb::rotation",
            target_tx = target,
            version = %current.version(),
            reason,
            "No-op rotation"
        );
        RotationOutcome {
            version: current.version(),
            previous: current.version(),
            entries: current.entry_count(),
            written: false,
        }
    }
}

/// Full outer merge of snapshot entries with sorted deltas
///
/// Keys present on both sides are summed. Keys whose total is zero are
/// dropped, since an absent key reads as zero.
pub fn merge_entries<I>(
    snapshot: I,
    deltas: &BTreeMap<CountsKey, CounterPair>,
) -> std::result::Result<Vec<(CountsKey, CounterPair)>, SnapshotError>
where
    I: Iterator<Item = std::result::Result<(CountsKey, CounterPair), SnapshotError>>,
{
    let mut merged = Vec::with_capacity(snapshot.size_hint().0 + deltas.len());
    let mut pending = deltas.iter().peekable();

    for entry in snapshot {
        let (key, mut pair) = entry?;
        while let Some(&(&delta_key, &delta)) = pending.peek() {
            if delta_key >= key {
                break;
            }
            push_non_zero(&mut merged, delta_key, delta);
            pending.next();
        }
        if let Some((_, &delta)) = pending.next_if(|(k, _)| **k == key) {
            pair += delta;
        }
        push_non_zero(&mut merged, key, pair);
    }
    for (&key, &delta) in pending {
        push_non_zero(&mut merged, key, delta);
    }
    Ok(merged)
}

fn push_non_zero(into: &mut Vec<(CountsKey, CounterPair)>, key: CountsKey, pair: CounterPair) {
    if !pair.is_zero() {
        into.push((key, pair));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(CountsKey, i64)]) -> Vec<std::result::Result<(CountsKey, CounterPair), SnapshotError>> {
        entries
            .iter()
            .map(|(k, c)| Ok((*k, CounterPair::count(*c))))
            .collect()
    }

    #[test]
    fn test_merge_full_outer() {
        let base = snapshot(&[(CountsKey::node(1), 1), (CountsKey::node(3), 3)]);
        let mut deltas = BTreeMap::new();
        deltas.insert(CountsKey::node(0), CounterPair::count(10));
        deltas.insert(CountsKey::node(3), CounterPair::count(1));
        deltas.insert(CountsKey::relationship(1, 1, 1), CounterPair::count(1));

        let merged = merge_entries(base.into_iter(), &deltas).unwrap();
        assert_eq!(
            merged,
            vec![
                (CountsKey::node(0), CounterPair::count(10)),
                (CountsKey::node(1), CounterPair::count(1)),
                (CountsKey::node(3), CounterPair::count(4)),
                (CountsKey::relationship(1, 1, 1), CounterPair::count(1)),
            ]
        );
    }

    #[test]
    fn test_merge_drops_zero_totals() {
        let base = snapshot(&[(CountsKey::node(1), 2)]);
        let mut deltas = BTreeMap::new();
        deltas.insert(CountsKey::node(1), CounterPair::count(-2));
        deltas.insert(CountsKey::node(2), CounterPair::ZERO);
        assert!(merge_entries(base.into_iter(), &deltas).unwrap().is_empty());
    }

    #[test]
    fn test_merge_propagates_read_errors() {
        let base = vec![Err(SnapshotError::CrcMismatch {
            stored: 1,
            computed: 2,
        })];
        assert!(merge_entries(base.into_iter(), &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            RotationState::Idle,
            RotationState::WaitingForTargetTx,
            RotationState::Draining,
            RotationState::Writing,
            RotationState::Swapping,
            RotationState::Done,
            RotationState::Aborted,
        ] {
            assert_eq!(RotationState::from_u8(state as u8), state);
        }
        assert!(RotationState::Writing.is_active());
        assert!(!RotationState::Done.is_active());
    }
}
