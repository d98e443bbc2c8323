//! Rebuilding counts from the graph store
//!
//! When no valid snapshot exists the store can be initialized from scratch
//! by a [`CountsBuilder`], typically a scan over the node and relationship
//! stores. This is the only place counters are set to absolute values.

use std::sync::Arc;

use countsdb_concurrency::{PendingDeltas, TxTracker, Updater};
use countsdb_core::{CounterPair, CountsKey, TxId};
use countsdb_durability::FileVersion;

/// Produces the full set of counts as of a transaction
pub trait CountsBuilder {
    /// Transaction the rebuilt counts reflect
    fn last_committed_tx_id(&self) -> TxId;

    /// Write every counter into `updater`
    fn initialize(&self, updater: &mut Updater<'_>);
}

/// Run a builder into a sorted entry list for the initial snapshot
pub(crate) fn rebuild(builder: &dyn CountsBuilder) -> (FileVersion, Vec<(CountsKey, CounterPair)>) {
    let scratch = PendingDeltas::new(Arc::new(TxTracker::default()));
    let mut updater = scratch.begin_untracked();
    builder.initialize(&mut updater);
    updater.close();

    let entries = scratch
        .sorted()
        .into_iter()
        .filter(|(_, pair)| !pair.is_zero())
        .collect();
    (FileVersion::new(builder.last_committed_tx_id(), 0), entries)
}
