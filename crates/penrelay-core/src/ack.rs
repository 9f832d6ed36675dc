//! Acknowledgment
//!
//! Purges applied entries from the remote buffer. Only keys the batch plan
//! says are covered by the watermark are removed, and they are removed from
//! the buffer's live contents in one read-modify-write, so entries that
//! arrived while the batch was being applied survive.

use std::sync::Arc;

use tracing::{debug, info};

use crate::buffer::RemoteBuffer;
use crate::error::RelayError;
use crate::models::{BufferEntry, QueueKey};
use crate::sequence::Plan;

/// Acknowledges processed batches against a remote buffer
pub struct Acknowledger {
    buffer: Arc<dyn RemoteBuffer>,
}

impl Acknowledger {
    pub fn new(buffer: Arc<dyn RemoteBuffer>) -> Self {
        Self { buffer }
    }

    /// Purge every entry of `plan` at or before `watermark`, plus rejected entries
    ///
    /// `watermark` is the key of the last successfully applied event; `None`
    /// means nothing was applied. Calling this again with an already
    /// acknowledged watermark is harmless. Returns the number of entries
    /// removed.
    pub async fn acknowledge(
        &self,
        user: &str,
        plan: &Plan,
        watermark: Option<&QueueKey>,
    ) -> Result<usize, RelayError> {
        let covered = plan.covered_through(watermark);
        if covered.is_empty() {
            debug!("Nothing to acknowledge");
            return Ok(0);
        }

        let removed = self
            .buffer
            .purge(user, &|entry: &BufferEntry| !covered.contains(&entry.key))
            .await
            .map_err(RelayError::Acknowledgment)?;

        info!(
            "Acknowledged {} of {} buffer entries through {}",
            removed,
            covered.len(),
            watermark.map_or("(none)", QueueKey::as_str)
        );
        Ok(removed)
    }
}
