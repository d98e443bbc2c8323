//! Error types for the counts store
//!
//! Layers keep their own detailed error enums (see the durability crate's
//! `SnapshotError`); everything surfaces to callers as [`Error`].

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::key::CorruptKeyError;
use crate::types::TxId;

/// Result type alias for counts store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the counts store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key failed to decode
    #[error("Corrupt counts key: {0}")]
    CorruptKey(#[from] CorruptKeyError),

    /// A snapshot file failed validation
    #[error("Corrupt counts file: {0}")]
    CorruptFile(String),

    /// Rotation gave up waiting for transactions up to the target to close
    #[error(
        "Rotation to tx {target} timed out after {waited:?}; transactions closed up to {high_water}"
    )]
    RotationTimeout {
        /// Requested target transaction
        target: TxId,
        /// Highest transaction id below which every transaction had closed
        high_water: TxId,
        /// Time spent waiting
        waited: Duration,
    },

    /// Another rotation holds the rotation lock
    #[error("Rotation already in progress")]
    RotationInProgress,

    /// Invalid argument from the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True for errors that mean on-disk data is damaged
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptKey(_) | Error::CorruptFile(_))
    }

    /// True for errors after which the same call may simply be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RotationTimeout { .. } | Error::RotationInProgress)
    }
}
