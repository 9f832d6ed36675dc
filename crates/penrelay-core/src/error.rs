//! Relay error handling
//!
//! Errors raised while consuming a batch. How far each one propagates is
//! decided by the relay:
//! - `Validation` skips a single entry.
//! - `Materialization` and `Configuration` abort the rest of the batch.
//! - `Acknowledgment` leaves the buffer untouched for the next attempt.

use thiserror::Error;

use crate::buffer::BufferError;
use crate::models::QueueKey;
use crate::vault::VaultError;

/// Errors that can occur while relaying a batch
#[derive(Error, Debug)]
pub enum RelayError {
    /// Buffer entry is malformed (no payload, missing or mistyped field)
    #[error("Invalid buffer entry '{key}': {reason}")]
    Validation { key: QueueKey, reason: String },

    /// Rendering or writing a note failed
    #[error("Failed to materialize note '{id}': {source}")]
    Materialization {
        id: String,
        #[source]
        source: MaterializationError,
    },

    /// Settings cannot be applied (e.g. unknown update mode)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Purging processed entries from the buffer failed
    #[error("Failed to acknowledge processed entries: {0}")]
    Acknowledgment(#[source] BufferError),

    /// Reading or observing the buffer failed
    #[error("Remote buffer error: {0}")]
    Buffer(#[source] BufferError),

    /// Indexing the vault failed before any event was applied
    #[error("Failed to index vault: {0}")]
    Index(#[source] VaultError),
}

impl RelayError {
    pub(crate) fn validation(key: &QueueKey, reason: impl Into<String>) -> Self {
        RelayError::Validation {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the remainder of the batch
    pub fn aborts_batch(&self) -> bool {
        !matches!(self, RelayError::Validation { .. })
    }
}

/// Why a single note could not be written
#[derive(Error, Debug)]
pub enum MaterializationError {
    /// The template could not be loaded or rendered
    #[error("template error: {0}")]
    Template(String),

    /// The vault rejected a read or write
    #[error(transparent)]
    Storage(#[from] VaultError),
}
