//! Snapshot recovery
//!
//! - `coordinator`: selects the current snapshot from the directory contents,
//!   quarantining corrupt files and removing stale and temporary ones

pub mod coordinator;

pub use coordinator::{RecoveryCoordinator, RecoveryReport, RecoveryResult};
