//! Batch processing
//!
//! One batch runs start to finish as:
//!
//! 1. sequence the buffer snapshot (normalize, order, dedupe)
//! 2. index the vault once
//! 3. apply each surviving event in order, updating the index after each write
//! 4. acknowledge everything up to the last applied event
//! 5. report the outcome
//!
//! Batches never overlap: `process` holds a lock for its whole run, so a
//! one-shot drain and a live session cannot interleave writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::ack::Acknowledger;
use crate::buffer::{FileBuffer, RemoteBuffer};
use crate::config::Config;
use crate::error::RelayError;
use crate::materializer::{Materializer, Outcome};
use crate::models::{BufferEntry, QueueKey};
use crate::resolver::NoteIndex;
use crate::sequence::sequence;
use crate::status::StatusReporter;
use crate::vault::{FsVault, Vault};

/// A note written during a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedNote {
    pub id: String,
    pub outcome: Outcome,
}

/// What happened to one batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Raw entries in the batch
    pub observed: usize,
    pub applied: Vec<AppliedNote>,
    /// Entries skipped as malformed
    pub rejected: Vec<RelayError>,
    /// Revisions dropped in favour of a later one for the same note
    pub superseded: usize,
    /// Entries removed from the buffer
    pub purged: usize,
    /// The session closed before every event was applied
    pub cancelled: bool,
    /// The error that stopped the batch, if any
    pub error: Option<RelayError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies buffer batches to a vault
pub struct Relay {
    buffer: Arc<dyn RemoteBuffer>,
    vault: Arc<dyn Vault>,
    materializer: Materializer,
    acknowledger: Acknowledger,
    reporter: StatusReporter,
    batch_lock: Mutex<()>,
}

impl Relay {
    pub fn new(buffer: Arc<dyn RemoteBuffer>, vault: Arc<dyn Vault>, config: Config) -> Self {
        Self {
            materializer: Materializer::new(vault.clone(), config),
            acknowledger: Acknowledger::new(buffer.clone()),
            buffer,
            vault,
            reporter: StatusReporter::new(),
            batch_lock: Mutex::new(()),
        }
    }

    /// Relay over the file buffer in the data directory and the configured vault
    pub fn open(config: &Config) -> Self {
        let buffer = FileBuffer::new(config.buffer_dir())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        let vault = FsVault::new(&config.vault_dir);
        Self::new(Arc::new(buffer), Arc::new(vault), config.clone())
    }

    pub fn buffer(&self) -> &Arc<dyn RemoteBuffer> {
        &self.buffer
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn config(&self) -> &Config {
        self.materializer.config()
    }

    /// Process whatever is in the user's buffer right now
    pub async fn drain(&self, user: &str) -> Result<BatchReport, RelayError> {
        let entries = self
            .buffer
            .snapshot(user)
            .await
            .map_err(RelayError::Buffer)?;

        self.reporter.session_established();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        Ok(self.process(user, &entries, &cancel_rx).await)
    }

    /// Apply one buffer snapshot
    ///
    /// `cancel` is checked between events; once it reads `true` no further
    /// events are started, and what was applied is still acknowledged.
    pub async fn process(
        &self,
        user: &str,
        entries: &[BufferEntry],
        cancel: &watch::Receiver<bool>,
    ) -> BatchReport {
        let _guard = self.batch_lock.lock().await;

        if entries.is_empty() {
            self.reporter.buffer_empty();
            return BatchReport::default();
        }

        self.reporter.batch_started(entries.len());
        let mut plan = sequence(entries);
        let mut report = BatchReport {
            observed: plan.observed(),
            superseded: plan.superseded(),
            rejected: std::mem::take(&mut plan.rejected),
            ..BatchReport::default()
        };

        for rejected in &report.rejected {
            self.reporter.warn(format!("Skipped entry: {}", rejected));
        }

        let mut watermark: Option<&QueueKey> = None;

        match NoteIndex::load(self.vault.as_ref()).await {
            Ok(mut index) => {
                for event in &plan.events {
                    if *cancel.borrow() {
                        info!("Session closing; stopping batch before {}", event.id);
                        report.cancelled = true;
                        break;
                    }

                    let existing = index.resolve(&event.id);
                    if let Some(note) = existing.as_ref().filter(|n| n.is_ambiguous()) {
                        self.reporter.warn(format!(
                            "{} notes carry id {}; updating {}",
                            note.matches,
                            event.id,
                            note.path.display()
                        ));
                    }

                    match self.materializer.apply(event, existing.as_ref()).await {
                        Ok(outcome) => {
                            index.record(&event.id, outcome.path());
                            report.applied.push(AppliedNote {
                                id: event.id.clone(),
                                outcome,
                            });
                            watermark = Some(&event.queue_key);
                        }
                        Err(e) if e.aborts_batch() => {
                            report.error = Some(e);
                            break;
                        }
                        Err(e) => warn!("Skipping {}: {}", event.id, e),
                    }
                }
            }
            Err(e) => report.error = Some(RelayError::Index(e)),
        }

        match self.acknowledger.acknowledge(user, &plan, watermark).await {
            Ok(purged) => report.purged = purged,
            // The batch error is what the user needs to see; the buffer is
            // re-driven either way
            Err(e) if report.error.is_some() => error!("{}", e),
            Err(e) => report.error = Some(e),
        }

        match &report.error {
            Some(e) => self.reporter.batch_failed(e),
            None if report.cancelled => {}
            None => self.reporter.batch_succeeded(report.applied.len()),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferError, BufferResult, KeepFn, MemoryBuffer, Subscription};
    use crate::config::UpdateMode;
    use crate::models::{BufferRecord, Platform};
    use crate::status::SyncStatus;
    use crate::vault::{NoteMeta, VaultError, VaultResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Vault that refuses to create notes whose path mentions "Boom"
    struct FailingVault {
        inner: FsVault,
    }

    #[async_trait]
    impl Vault for FailingVault {
        async fn list_notes(&self) -> VaultResult<Vec<NoteMeta>> {
            self.inner.list_notes().await
        }

        async fn read_note(&self, path: &Path) -> VaultResult<String> {
            self.inner.read_note(path).await
        }

        async fn create_note(&self, path: &Path, content: &str) -> VaultResult<()> {
            if path.to_string_lossy().contains("Boom") {
                return Err(VaultError::WriteError {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "device error"),
                });
            }
            self.inner.create_note(path, content).await
        }

        async fn overwrite_note(&self, path: &Path, content: &str) -> VaultResult<()> {
            self.inner.overwrite_note(path, content).await
        }
    }

    /// Vault that pushes a new buffer entry while a note is being created
    struct ArrivalVault {
        inner: FsVault,
        buffer: Arc<MemoryBuffer>,
    }

    #[async_trait]
    impl Vault for ArrivalVault {
        async fn list_notes(&self) -> VaultResult<Vec<NoteMeta>> {
            self.inner.list_notes().await
        }

        async fn read_note(&self, path: &Path) -> VaultResult<String> {
            self.inner.read_note(path).await
        }

        async fn create_note(&self, path: &Path, content: &str) -> VaultResult<()> {
            self.buffer
                .push("u", record(json!({"id": "late", "title": "Late"})))
                .await
                .map_err(|e| VaultError::Scan(e.to_string()))?;
            self.inner.create_note(path, content).await
        }

        async fn overwrite_note(&self, path: &Path, content: &str) -> VaultResult<()> {
            self.inner.overwrite_note(path, content).await
        }
    }

    /// Buffer whose purge always fails
    struct UnackableBuffer {
        inner: MemoryBuffer,
    }

    #[async_trait]
    impl RemoteBuffer for UnackableBuffer {
        async fn subscribe(&self, user: &str) -> BufferResult<Subscription> {
            self.inner.subscribe(user).await
        }

        async fn snapshot(&self, user: &str) -> BufferResult<Vec<BufferEntry>> {
            self.inner.snapshot(user).await
        }

        async fn push(&self, user: &str, record: BufferRecord) -> BufferResult<QueueKey> {
            self.inner.push(user, record).await
        }

        async fn purge(&self, _user: &str, _keep: &KeepFn<'_>) -> BufferResult<usize> {
            Err(BufferError::Task("buffer unreachable".to_string()))
        }
    }

    fn record(data: Value) -> BufferRecord {
        BufferRecord::new(Platform::AudioPen, data)
    }

    fn note(id: &str, title: &str, body: &str, date: &str) -> BufferRecord {
        record(json!({
            "id": id,
            "title": title,
            "body": body,
            "tags": ["a", "b"],
            "date_created": date
        }))
    }

    fn config(mode: UpdateMode) -> Config {
        Config {
            update_mode: mode,
            ..Config::default()
        }
    }

    fn setup(mode: UpdateMode) -> (TempDir, Arc<MemoryBuffer>, Relay) {
        let temp_dir = TempDir::new().unwrap();
        let buffer = Arc::new(MemoryBuffer::new());
        let vault = Arc::new(FsVault::new(temp_dir.path()));
        let relay = Relay::new(buffer.clone(), vault, config(mode));
        (temp_dir, buffer, relay)
    }

    fn read(dir: &TempDir, path: &str) -> String {
        std::fs::read_to_string(dir.path().join(path)).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_note() {
        let (dir, buffer, relay) = setup(UpdateMode::New);
        buffer
            .push("u", note("n1", "Hello", "World", "2024-01-01"))
            .await
            .unwrap();

        let report = relay.drain("u").await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.purged, 1);

        let content = read(&dir, "AudioPen/Hello.md");
        assert!(content.contains("audioPenID: n1"));
        assert!(content.contains("  - \"[[a]]\"\n  - \"[[b]]\""));
        assert!(buffer.snapshot("u").await.unwrap().is_empty());
        assert_eq!(relay.reporter().status(), SyncStatus::Ok);
    }

    #[tokio::test]
    async fn test_duplicates_materialize_once() {
        let (dir, buffer, relay) = setup(UpdateMode::New);
        let revisions = [
            ("v1", "2024-01-01T10:00:00Z"),
            ("v3", "2024-01-01T12:00:00Z"),
            ("v2", "2024-01-01T11:00:00Z"),
        ];
        for (body, date) in revisions {
            buffer
                .push("u", note("n1", "Hello", body, date))
                .await
                .unwrap();
        }

        let report = relay.drain("u").await.unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.superseded, 2);
        assert_eq!(report.purged, 3);
        assert!(read(&dir, "AudioPen/Hello.md").contains("\nv3\n"));
        assert!(!dir.path().join("AudioPen/Hello V2.md").exists());
    }

    #[tokio::test]
    async fn test_watermark_purges_every_observed_entry() {
        let (_dir, buffer, relay) = setup(UpdateMode::Overwrite);
        let batch = [
            ("A", "2024-01-01"),
            ("B", "2024-01-02"),
            ("A", "2024-01-03"),
            ("C", "2024-01-04"),
            ("B", "2024-01-05"),
        ];
        for (id, date) in batch {
            buffer.push("u", note(id, id, "body", date)).await.unwrap();
        }

        let report = relay.drain("u").await.unwrap();

        assert_eq!(report.observed, 5);
        assert_eq!(report.applied.len(), 3);
        assert_eq!(report.purged, 5);
        assert!(buffer.snapshot("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_later_events_unacknowledged() {
        let temp_dir = TempDir::new().unwrap();
        let buffer = Arc::new(MemoryBuffer::new());
        let vault = Arc::new(FailingVault {
            inner: FsVault::new(temp_dir.path()),
        });
        let relay = Relay::new(buffer.clone(), vault, config(UpdateMode::New));

        buffer
            .push("u", note("n1", "Hello", "first", "2024-01-01"))
            .await
            .unwrap();
        let failing = buffer
            .push("u", note("n2", "Boom", "second", "2024-01-02"))
            .await
            .unwrap();

        let report = relay.drain("u").await.unwrap();

        assert!(matches!(
            report.error,
            Some(RelayError::Materialization { ref id, .. }) if id == "n2"
        ));
        assert_eq!(report.applied.len(), 1);
        assert!(temp_dir.path().join("AudioPen/Hello.md").exists());
        assert!(!temp_dir.path().join("AudioPen/Boom.md").exists());

        let remaining = buffer.snapshot("u").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, failing);
        assert_eq!(relay.reporter().status(), SyncStatus::Error);
    }

    #[tokio::test]
    async fn test_acknowledgment_failure_leaves_buffer_intact() {
        let temp_dir = TempDir::new().unwrap();
        let buffer = Arc::new(UnackableBuffer {
            inner: MemoryBuffer::new(),
        });
        let vault = Arc::new(FsVault::new(temp_dir.path()));
        let relay = Relay::new(buffer.clone(), vault, config(UpdateMode::Overwrite));
        buffer
            .push("u", note("n1", "Hello", "World", "2024-01-01"))
            .await
            .unwrap();

        let report = relay.drain("u").await.unwrap();
        assert!(matches!(report.error, Some(RelayError::Acknowledgment(_))));
        assert_eq!(relay.reporter().status(), SyncStatus::Error);
        assert_eq!(buffer.snapshot("u").await.unwrap().len(), 1);

        // Re-driving the unpurged buffer is safe under overwrite
        let first = std::fs::read_to_string(temp_dir.path().join("AudioPen/Hello.md")).unwrap();
        relay.drain("u").await.unwrap();
        let second = std::fs::read_to_string(temp_dir.path().join("AudioPen/Hello.md")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejected_entries_are_skipped_and_purged() {
        let (_dir, buffer, relay) = setup(UpdateMode::New);
        buffer
            .push(
                "u",
                BufferRecord {
                    platform: None,
                    exp: None,
                    data: None,
                },
            )
            .await
            .unwrap();
        buffer
            .push("u", note("n1", "Hello", "World", "2024-01-01"))
            .await
            .unwrap();

        let report = relay.drain("u").await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.purged, 2);
        assert_eq!(relay.reporter().status(), SyncStatus::Ok);
    }

    #[tokio::test]
    async fn test_entries_arriving_mid_batch_survive() {
        let temp_dir = TempDir::new().unwrap();
        let buffer = Arc::new(MemoryBuffer::new());
        let vault = Arc::new(ArrivalVault {
            inner: FsVault::new(temp_dir.path()),
            buffer: buffer.clone(),
        });
        let relay = Relay::new(buffer.clone(), vault, config(UpdateMode::New));
        buffer
            .push("u", note("n1", "Hello", "World", "2024-01-01"))
            .await
            .unwrap();

        let report = relay.drain("u").await.unwrap();
        assert_eq!(report.purged, 1);

        let remaining = buffer.snapshot("u").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record.data.as_ref().unwrap()["id"], "late");
    }

    #[tokio::test]
    async fn test_cancelled_batch_applies_nothing_further() {
        let (_dir, buffer, relay) = setup(UpdateMode::New);
        buffer
            .push("u", note("n1", "Hello", "World", "2024-01-01"))
            .await
            .unwrap();
        let entries = buffer.snapshot("u").await.unwrap();

        let (_tx, cancel) = watch::channel(true);
        let report = relay.process("u", &entries, &cancel).await;

        assert!(report.cancelled);
        assert!(report.applied.is_empty());
        assert_eq!(report.purged, 0);
        assert_eq!(buffer.snapshot("u").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versions_count_up_across_batches() {
        let (dir, buffer, relay) = setup(UpdateMode::New);
        for body in ["one", "two", "three"] {
            buffer
                .push("u", note("n1", "Hello", body, "2024-01-01"))
                .await
                .unwrap();
            relay.drain("u").await.unwrap();
        }

        let mut names: Vec<PathBuf> = std::fs::read_dir(dir.path().join("AudioPen"))
            .unwrap()
            .map(|e| PathBuf::from(e.unwrap().file_name()))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                PathBuf::from("Hello V2.md"),
                PathBuf::from("Hello V3.md"),
                PathBuf::from("Hello.md"),
            ]
        );
    }

    #[tokio::test]
    async fn test_append_across_batches() {
        let (dir, buffer, relay) = setup(UpdateMode::Append);
        buffer
            .push("u", note("n1", "Hello", "X", "2024-01-01"))
            .await
            .unwrap();
        relay.drain("u").await.unwrap();
        buffer
            .push("u", note("n1", "Hello", "Y", "2024-01-01"))
            .await
            .unwrap();
        relay.drain("u").await.unwrap();

        let content = read(&dir, "AudioPen/Hello.md");
        assert!(content.ends_with("#V2Y"));
        assert!(content.contains("\nX\n"));
    }

    #[tokio::test]
    async fn test_empty_buffer_reports_ok() {
        let (_dir, _buffer, relay) = setup(UpdateMode::New);
        let report = relay.drain("u").await.unwrap();
        assert_eq!(report.observed, 0);
        assert_eq!(relay.reporter().status(), SyncStatus::Ok);
    }
}
