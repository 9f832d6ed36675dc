//! Sync status reporting
//!
//! ```text
//! offline ──session──▶ ok ──non-empty batch──▶ sync ──applied──▶ ok
//!                                               └────failed───▶ error
//! ```
//!
//! The status is observational only: nothing reads it to decide whether to
//! retry. Alongside the status, human-readable notices are broadcast for
//! whoever is listening (the CLI prints them).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;

const NOTICE_CAPACITY: usize = 64;

/// Relay status as surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No session
    Offline,
    /// Session active, buffer empty or last batch applied
    Ok,
    /// Batch in progress
    Sync,
    /// Last batch aborted or could not be acknowledged
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Offline => "offline",
            SyncStatus::Ok => "ok",
            SyncStatus::Sync => "sync",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Owns the status state machine and the notice channel
#[derive(Clone)]
pub struct StatusReporter {
    status_tx: Arc<watch::Sender<SyncStatus>>,
    notice_tx: broadcast::Sender<Notice>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Offline);
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            status_tx: Arc::new(status_tx),
            notice_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_tx.borrow()
    }

    pub fn session_established(&self) {
        self.transition(SyncStatus::Ok);
    }

    /// A change notification arrived with entries to process
    pub fn batch_started(&self, entries: usize) {
        debug!("Batch of {} entries started", entries);
        self.transition(SyncStatus::Sync);
    }

    /// The batch was applied and acknowledged
    pub fn batch_succeeded(&self, applied: usize) {
        self.transition(SyncStatus::Ok);
        if applied > 0 {
            let noun = if applied == 1 { "note" } else { "notes" };
            self.notify(NoticeLevel::Info, format!("Imported {} {}", applied, noun));
        }
    }

    /// The batch aborted or could not be acknowledged
    pub fn batch_failed(&self, err: &RelayError) {
        self.transition(SyncStatus::Error);
        self.notify(NoticeLevel::Error, format!("Error: {}", err));
    }

    /// A change notification arrived with nothing in it
    pub fn buffer_empty(&self) {
        if self.status() != SyncStatus::Offline {
            self.transition(SyncStatus::Ok);
        }
    }

    pub fn session_closed(&self) {
        self.transition(SyncStatus::Offline);
    }

    /// Surface a problem that did not stop the batch
    pub fn warn(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Warning, message.into());
    }

    fn transition(&self, to: SyncStatus) {
        let from = self.status_tx.send_replace(to);
        if from != to {
            debug!("Status {} -> {}", from, to);
        }
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Warning => warn!("{}", message),
            NoticeLevel::Error => error!("{}", message),
        }
        // No listeners is fine
        let _ = self.notice_tx.send(Notice { level, message });
    }
}
