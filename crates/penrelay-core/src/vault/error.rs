//! Vault error handling
//!
//! Typed errors for local note storage, classified from the underlying
//! I/O error so callers can tell a name collision from a full disk.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing vault notes
#[derive(Error, Debug)]
pub enum VaultError {
    /// A note already exists at the target path
    #[error("A note already exists at '{path}'")]
    AlreadyExists { path: PathBuf },

    /// The path is not acceptable as a note name
    #[error("Invalid note path '{path}': {reason}")]
    InvalidName { path: PathBuf, reason: String },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error("Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again.")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Note not found (when expected to exist)
    #[error("Note not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Failed to read note
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write note
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Background scan task failed
    #[error("Vault scan failed: {0}")]
    Scan(String),
}

impl VaultError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (collision, permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::AlreadyExists => VaultError::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => VaultError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => VaultError::NotFound { path },
            io::ErrorKind::InvalidInput => VaultError::InvalidName {
                path,
                reason: error.to_string(),
            },
            _ if is_disk_full_error(&error) => VaultError::DiskFull {
                path,
                source: error,
            },
            _ => VaultError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Whether a create failed because of the chosen name
    ///
    /// These are the failures a create may retry once under a
    /// disambiguated name.
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            VaultError::AlreadyExists { .. } | VaultError::InvalidName { .. }
        )
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;
