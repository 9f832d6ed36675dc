//! Remote buffer
//!
//! The buffer is a per-user ordered collection of pending note records.
//! Ingress appends to it; the relay observes it, applies what it finds and
//! purges what it applied. The buffer has no locking primitive exposed to
//! consumers, so purging is a single read-modify-write: the caller decides
//! which of the *live* entries to keep, and everything else goes.
//!
//! Two implementations are provided:
//! - `MemoryBuffer`: in-process, change notifications are immediate
//! - `FileBuffer`: one JSON file per user, shared between processes under a
//!   file lock, observed by polling

mod file;
mod memory;

pub use file::FileBuffer;
pub use memory::MemoryBuffer;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::models::{BufferEntry, BufferRecord, QueueKey};

/// Errors raised by buffer implementations
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Buffer I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not lock buffer {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Buffer file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid user id '{0}'")]
    InvalidUser(String),

    #[error("Buffer task failed: {0}")]
    Task(String),
}

pub type BufferResult<T> = Result<T, BufferError>;

/// Decides, per live entry, whether it survives a purge
pub type KeepFn<'a> = dyn Fn(&BufferEntry) -> bool + Send + Sync + 'a;

/// A per-user remote queue of note records
#[async_trait]
pub trait RemoteBuffer: Send + Sync {
    /// Observe the user's buffer
    ///
    /// The first delivery is the current contents; later deliveries follow
    /// changes. Dropping the subscription stops observation.
    async fn subscribe(&self, user: &str) -> BufferResult<Subscription>;

    /// Current contents in queue-key order
    async fn snapshot(&self, user: &str) -> BufferResult<Vec<BufferEntry>>;

    /// Append a record under a fresh key greater than every existing key
    async fn push(&self, user: &str, record: BufferRecord) -> BufferResult<QueueKey>;

    /// Atomically drop every live entry `keep` rejects
    ///
    /// Returns how many entries were removed. Entries pushed concurrently are
    /// evaluated against `keep` like any other live entry.
    async fn purge(&self, user: &str, keep: &KeepFn<'_>) -> BufferResult<usize>;
}

/// A live view of one user's buffer
pub struct Subscription {
    rx: watch::Receiver<Vec<BufferEntry>>,
    delivered: bool,
    poller: Option<AbortHandle>,
}

impl Subscription {
    pub(crate) fn new(rx: watch::Receiver<Vec<BufferEntry>>, poller: Option<AbortHandle>) -> Self {
        Self {
            rx,
            delivered: false,
            poller,
        }
    }

    /// Wait for the next delivery
    ///
    /// Changes that land while the caller is busy are coalesced into one
    /// delivery of the latest contents. Returns `None` once the buffer stops
    /// publishing. Cancel safe.
    pub async fn next(&mut self) -> Option<Vec<BufferEntry>> {
        if self.delivered {
            self.rx.changed().await.ok()?;
        }
        self.delivered = true;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// User ids name files and map keys; keep them to a single plain component
pub(crate) fn validate_user(user: &str) -> BufferResult<()> {
    let valid = !user.is_empty()
        && !user.starts_with('.')
        && !user.contains(['/', '\\', '\0'])
        && !user.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(BufferError::InvalidUser(user.to_string()))
    }
}
