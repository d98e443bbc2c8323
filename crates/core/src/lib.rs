//! Core types for the counts store
//!
//! This crate defines the data model shared by every layer:
//! - CountsKey: closed set of counter keys with fixed-width, order-preserving encoding
//! - CounterPair: two signed 64-bit counters updated by relative deltas
//! - CountsVisitor: per-key-type dispatch
//! - TxId / CountsDeltaBatch: the transaction stream the store consumes
//! - Error: store-wide error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod error;
pub mod key;
pub mod types;
pub mod visitor;

pub use counter::{CounterPair, COUNTER_PAIR_SIZE};
pub use error::{Error, Result};
pub use key::{key_tags, CorruptKeyError, CountsKey, ANY_LABEL, ANY_RELATIONSHIP_TYPE, KEY_SIZE};
pub use types::{CountsDeltaBatch, TxId, BASE_TX_ID};
pub use visitor::{CollectingVisitor, CountsVisitor};
