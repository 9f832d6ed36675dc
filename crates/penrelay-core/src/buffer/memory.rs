//! In-process buffer

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};

use super::{validate_user, BufferError, BufferResult, KeepFn, RemoteBuffer, Subscription};
use crate::models::{BufferEntry, BufferRecord, QueueKey};

/// Buffer held in memory, one watch channel per user
///
/// Subscribers are notified as soon as a push or purge changes the
/// contents.
#[derive(Default)]
pub struct MemoryBuffer {
    users: Mutex<HashMap<String, watch::Sender<Vec<BufferEntry>>>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_channel<T>(
        &self,
        user: &str,
        f: impl FnOnce(&watch::Sender<Vec<BufferEntry>>) -> T,
    ) -> BufferResult<T> {
        validate_user(user)?;
        let mut users = self.users.lock().await;
        let sender = users
            .entry(user.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        Ok(f(sender))
    }
}

#[async_trait]
impl RemoteBuffer for MemoryBuffer {
    async fn subscribe(&self, user: &str) -> BufferResult<Subscription> {
        let rx = self.with_channel(user, |tx| tx.subscribe()).await?;
        Ok(Subscription::new(rx, None))
    }

    async fn snapshot(&self, user: &str) -> BufferResult<Vec<BufferEntry>> {
        self.with_channel(user, |tx| tx.borrow().clone()).await
    }

    async fn push(&self, user: &str, record: BufferRecord) -> BufferResult<QueueKey> {
        self.with_channel(user, |tx| {
            let mut pushed = None;
            tx.send_modify(|entries| {
                let prev = entries.iter().map(|e| &e.key).max();
                let key = QueueKey::next_after(prev, Utc::now());
                entries.push(BufferEntry::new(key.clone(), record));
                pushed = Some(key);
            });
            pushed
        })
        .await?
        .ok_or_else(|| BufferError::Task("push did not run".to_string()))
    }

    async fn purge(&self, user: &str, keep: &KeepFn<'_>) -> BufferResult<usize> {
        self.with_channel(user, |tx| {
            let mut removed = 0;
            tx.send_if_modified(|entries| {
                let before = entries.len();
                entries.retain(|e| keep(e));
                removed = before - entries.len();
                removed > 0
            });
            removed
        })
        .await
    }
}
