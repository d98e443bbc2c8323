//! Concurrency layer for the counts store
//!
//! This crate holds the in-memory side of the store:
//! - TxTracker: contiguous high-water mark over out-of-order transaction closes
//! - PendingDeltas / Updater: thread-safe buffer of closed, unrotated deltas
//! - VersionContext: dirty-read detection for reads spanning a commit or rotation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod tracker;
pub mod version_context;

pub use buffer::{BufferedCount, DrainedDeltas, PendingDeltas, Updater};
pub use tracker::{Admission, TxTracker, WaitTimedOut};
pub use version_context::{LastClosedTxId, VersionContext};
