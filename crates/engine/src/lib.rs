//! Counts store engine
//!
//! This crate orchestrates all lower layers:
//! - CountsStore: open/recover, apply, lookup, visit
//! - Rotation: wait for a target transaction, write and publish a snapshot
//! - Log recovery and rebuild from a builder
//! - Configuration (`counts.toml`)
//!
//! The engine is the only component that knows about:
//! - The published snapshot pointer and its swap
//! - Cross-layer coordination (buffer + snapshot files + recovery)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod recovery;
pub mod rotation;
pub mod store;

pub use builder::CountsBuilder;
pub use config::{ConfigError, CountsConfig, CONFIG_FILE_NAME};
pub use recovery::RecoveryStats;
pub use rotation::{merge_entries, RotationMetrics, RotationOutcome, RotationState, RotationStats};
pub use store::CountsStore;

pub use countsdb_concurrency::{Updater, VersionContext};
pub use countsdb_core::{
    key_tags, CollectingVisitor, CorruptKeyError, CounterPair, CountsDeltaBatch, CountsKey,
    CountsVisitor, Error, Result, TxId, ANY_LABEL, ANY_RELATIONSHIP_TYPE, BASE_TX_ID,
};
pub use countsdb_durability::{
    CacheStats, CrashPoint, FaultMode, FileVersion, RecoveryReport, WriteFault,
};
