//! countsdb - Crash-safe transactional counts store
//!
//! Maintains graph statistics (node counts per label, relationship counts per
//! `(start label, type, end label)` pattern, and index statistics/samples) as
//! signed counter pairs. Committing transactions apply deltas, and rotation
//! periodically publishes an immutable sorted snapshot file reflecting every
//! transaction up to a target id.
//!
//! # Quick Start
//!
//! ```ignore
//! use countsdb::{CountsConfig, CountsStore};
//!
//! let store = CountsStore::open(CountsConfig::new("/data/counts"))?;
//!
//! let mut updater = store.apply(1);
//! updater.increment_node_count(0, 1);
//! updater.close();
//!
//! assert_eq!(store.node_count(0)?, 1);
//! store.rotate(1)?;
//! ```
//!
//! # Architecture
//!
//! - `countsdb-core`: keys, counter pairs, errors
//! - `countsdb-durability`: snapshot file format, page cache, recovery
//! - `countsdb-concurrency`: transaction tracking and the pending delta buffer
//! - `countsdb-engine`: the store, rotation and log recovery
//!
//! Only the engine API is re-exported here.

pub use countsdb_engine::*;
