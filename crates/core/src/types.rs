//! Transaction ids and delta batches
//!
//! The store is driven by the surrounding engine's transaction stream. Each
//! committing transaction hands over one [`CountsDeltaBatch`].

use serde::{Deserialize, Serialize};

use crate::counter::CounterPair;
use crate::key::CountsKey;

/// Transaction identifier assigned by the surrounding engine
///
/// Ids are dense and increase by one per committed transaction.
pub type TxId = u64;

/// Transaction id of an empty store that has seen no transactions
pub const BASE_TX_ID: TxId = 0;

/// Counter deltas produced by one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsDeltaBatch {
    /// Committing transaction
    pub tx_id: TxId,
    /// `(key, delta)` pairs; the same key may appear more than once
    pub deltas: Vec<(CountsKey, CounterPair)>,
}

impl CountsDeltaBatch {
    /// Create an empty batch for a transaction
    pub fn new(tx_id: TxId) -> Self {
        CountsDeltaBatch {
            tx_id,
            deltas: Vec::new(),
        }
    }

    /// Add a delta (builder style)
    pub fn with(mut self, key: CountsKey, delta: CounterPair) -> Self {
        self.deltas.push((key, delta));
        self
    }

    /// Add a delta
    pub fn push(&mut self, key: CountsKey, delta: CounterPair) {
        self.deltas.push((key, delta));
    }

    /// True when the batch carries no deltas
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
