//! Per-operation version context for dirty-read detection
//!
//! A reader captures the last closed transaction id when it starts. Every
//! lookup it performs reports the transaction ids its answer was built from
//! (the snapshot's id and the newest buffered contribution). Anything newer
//! than the captured boundary means the answer may mix states from before and
//! after the read started, and the context is marked dirty.
//!
//! Detection is advisory. Reads are never blocked or aborted; the caller
//! checks [`VersionContext::is_dirty`] afterwards and retries if it cares.

use countsdb_core::{TxId, BASE_TX_ID};

use crate::tracker::TxTracker;

/// Source of the last closed transaction id
pub trait LastClosedTxId {
    /// Highest id below which every transaction has closed
    fn last_closed_tx_id(&self) -> TxId;
}

impl LastClosedTxId for TxTracker {
    fn last_closed_tx_id(&self) -> TxId {
        self.high_water()
    }
}

/// Read or write boundary of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionContext {
    last_closed_at_start: TxId,
    committing_tx: Option<TxId>,
    dirty: bool,
}

impl VersionContext {
    /// Context with a zero boundary; call `init_read` or `init_write` before use
    pub fn new() -> Self {
        VersionContext {
            last_closed_at_start: BASE_TX_ID,
            committing_tx: None,
            dirty: false,
        }
    }

    /// Start a read at the current last closed transaction id
    pub fn init_read(&mut self, source: &dyn LastClosedTxId) {
        self.last_closed_at_start = source.last_closed_tx_id();
        self.committing_tx = None;
        self.dirty = false;
    }

    /// Start a write on behalf of a committing transaction
    pub fn init_write(&mut self, source: &dyn LastClosedTxId, committing_tx: TxId) {
        self.last_closed_at_start = source.last_closed_tx_id();
        self.committing_tx = Some(committing_tx);
        self.dirty = false;
    }

    /// Flag the current operation's reads as possibly inconsistent
    pub fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }

    /// True if any read since init may have crossed the boundary
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Last closed transaction id captured at init
    pub fn last_closed_at_start(&self) -> TxId {
        self.last_closed_at_start
    }

    /// Committing transaction of a write context
    pub fn committing_tx(&self) -> Option<TxId> {
        self.committing_tx
    }

    /// Newest transaction id whose effects this operation may see
    pub fn boundary(&self) -> TxId {
        self.committing_tx.unwrap_or(self.last_closed_at_start)
    }

    /// Record that a read observed state produced by `tx_id`
    pub fn observe(&mut self, tx_id: TxId) {
        if tx_id > self.boundary() {
            self.mark_as_dirty();
        }
    }
}

impl Default for VersionContext {
    fn default() -> Self {
        Self::new()
    }
}
