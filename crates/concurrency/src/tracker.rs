//! Transaction close tracker
//!
//! Transactions close out of id order. The tracker keeps the contiguous
//! high-water mark: the largest id `h` such that every id in `(base, h]` has
//! closed. Ids closed above the mark wait in a set until the gap below them
//! fills.
//!
//! Rotation blocks on the mark with a condition variable: every close that
//! moves the mark wakes all waiters, so there is no polling.
//!
//! ## Admission
//!
//! ```text
//! id <= high_water          -> Stale      (already closed, possibly rotated)
//! id closed above the mark  -> Duplicate
//! id currently open         -> Duplicate
//! otherwise                 -> Admitted   (id becomes open)
//! ```

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use countsdb_core::{TxId, BASE_TX_ID};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;

/// Result of asking to open a transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Id is now open and must be closed or abandoned
    Admitted,
    /// Id is at or below the high-water mark
    Stale {
        /// Mark at the time of the request
        high_water: TxId,
    },
    /// Id is open elsewhere or already closed above the mark
    Duplicate,
}

/// Wait for the high-water mark ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimedOut {
    /// Mark when the wait gave up
    pub high_water: TxId,
    /// Time spent waiting
    pub waited: Duration,
}

#[derive(Debug)]
struct TrackerState {
    high_water: TxId,
    closed_above: BTreeSet<TxId>,
    open: FxHashSet<TxId>,
}

/// Tracks which transaction ids have closed
#[derive(Debug)]
pub struct TxTracker {
    state: Mutex<TrackerState>,
    advanced: Condvar,
}

impl TxTracker {
    /// Create a tracker whose mark starts at `base`
    pub fn new(base: TxId) -> Self {
        TxTracker {
            state: Mutex::new(TrackerState {
                high_water: base,
                closed_above: BTreeSet::new(),
                open: FxHashSet::default(),
            }),
            advanced: Condvar::new(),
        }
    }

    /// Contiguous high-water mark
    pub fn high_water(&self) -> TxId {
        self.state.lock().high_water
    }

    /// Largest id closed so far, contiguous or not
    pub fn max_closed(&self) -> TxId {
        let state = self.state.lock();
        state
            .closed_above
            .iter()
            .next_back()
            .copied()
            .unwrap_or(state.high_water)
    }

    /// Number of ids currently open
    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    /// True if `tx_id` is closed
    pub fn is_closed(&self, tx_id: TxId) -> bool {
        let state = self.state.lock();
        tx_id <= state.high_water || state.closed_above.contains(&tx_id)
    }

    /// Try to open a transaction id
    pub fn open(&self, tx_id: TxId) -> Admission {
        let mut state = self.state.lock();
        if tx_id <= state.high_water {
            return Admission::Stale {
                high_water: state.high_water,
            };
        }
        if state.closed_above.contains(&tx_id) || !state.open.insert(tx_id) {
            return Admission::Duplicate;
        }
        Admission::Admitted
    }

    /// Close an open id, advancing the mark if it filled the gap
    pub fn close(&self, tx_id: TxId) {
        let mut state = self.state.lock();
        if !state.open.remove(&tx_id) {
            return;
        }
        if state.high_water.checked_add(1) == Some(tx_id) {
            state.high_water = tx_id;
            while let Some(next) = state.high_water.checked_add(1) {
                if !state.closed_above.remove(&next) {
                    break;
                }
                state.high_water = next;
            }
            self.advanced.notify_all();
        } else {
            state.closed_above.insert(tx_id);
        }
    }

    /// Give up an open id without closing it
    ///
    /// The id can be opened again, e.g. by log replay.
    pub fn abandon(&self, tx_id: TxId) {
        self.state.lock().open.remove(&tx_id);
    }

    /// Block until the mark reaches `target` or `timeout` elapses
    pub fn wait_for(&self, target: TxId, timeout: Duration) -> Result<TxId, WaitTimedOut> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut state = self.state.lock();
        while state.high_water < target {
            if self.advanced.wait_until(&mut state, deadline).timed_out()
                && state.high_water < target
            {
                return Err(WaitTimedOut {
                    high_water: state.high_water,
                    waited: start.elapsed(),
                });
            }
        }
        Ok(state.high_water)
    }
}

impl Default for TxTracker {
    fn default() -> Self {
        Self::new(BASE_TX_ID)
    }
}
