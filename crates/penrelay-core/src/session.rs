//! Live relay session
//!
//! A session observes one user's buffer and runs a batch whenever it changes,
//! one batch at a time. A delivery only wakes the session: the batch is
//! always taken from a fresh snapshot, since a delivery queued while a batch
//! was running can still hold entries that batch purged. Changes that land
//! mid-batch coalesce into a single wake-up.
//!
//! Shutting a session down stops observation. A batch in flight finishes the
//! event it is on, acknowledges what was applied, and the status goes back
//! to offline.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::Subscription;
use crate::error::RelayError;
use crate::relay::Relay;
use crate::status::{Notice, SyncStatus};

/// Commands sent to the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Process the current buffer contents without waiting for a change
    Retry,
}

/// Handle to control and observe a running session
pub struct SessionHandle {
    /// Watch relay status
    pub status_rx: watch::Receiver<SyncStatus>,
    /// Receive user-facing notices
    pub notices: broadcast::Receiver<Notice>,
    command_tx: mpsc::Sender<SessionCommand>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Ask the session to re-drive the buffer; false if it has stopped
    pub async fn retry(&self) -> bool {
        self.command_tx.send(SessionCommand::Retry).await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the session and wait for it to wind down
    pub async fn shutdown(self) {
        let _ = self.cancel_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Session task ended abnormally: {}", e);
        }
    }
}

pub struct Session;

impl Session {
    /// Subscribe to `user`'s buffer and start relaying
    ///
    /// Fails if the buffer cannot be observed; once running, failures are
    /// reported through the status and notices instead.
    pub async fn start(relay: Arc<Relay>, user: impl Into<String>) -> Result<SessionHandle, RelayError> {
        let user = user.into();
        let subscription = relay
            .buffer()
            .subscribe(&user)
            .await
            .map_err(RelayError::Buffer)?;

        let status_rx = relay.reporter().subscribe();
        let notices = relay.reporter().notices();
        let (command_tx, command_rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        relay.reporter().session_established();
        info!("Session started for user {}", user);

        let task = tokio::spawn(session_loop(relay, user, subscription, command_rx, cancel_rx));

        Ok(SessionHandle {
            status_rx,
            notices,
            command_tx,
            cancel_tx,
            task,
        })
    }
}

async fn session_loop(
    relay: Arc<Relay>,
    user: String,
    mut subscription: Subscription,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            // A dropped handle counts as shutdown
            _ = cancel_rx.changed() => break,

            cmd = command_rx.recv() => match cmd {
                Some(SessionCommand::Retry) => {}
                None => break,
            },

            delivery = subscription.next() => {
                if delivery.is_none() {
                    warn!("Buffer for {} stopped publishing", user);
                    break;
                }
            }
        }

        // A delivery may predate the last purge; only the live contents count
        let entries = match relay.buffer().snapshot(&user).await {
            Ok(entries) => entries,
            Err(e) => {
                relay.reporter().batch_failed(&RelayError::Buffer(e));
                continue;
            }
        };

        let report = relay.process(&user, &entries, &cancel_rx).await;
        debug!(
            "Batch done: {} observed, {} applied, {} rejected, {} purged",
            report.observed,
            report.applied.len(),
            report.rejected.len(),
            report.purged
        );

        if report.cancelled || *cancel_rx.borrow() {
            break;
        }
    }

    drop(subscription);
    relay.reporter().session_closed();
    info!("Session for user {} stopped", user);
}
