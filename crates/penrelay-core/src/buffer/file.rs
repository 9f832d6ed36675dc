//! File-backed buffer
//!
//! Each user's buffer is a JSON array in `{dir}/{user}.json`. Writers take an
//! exclusive lock on `{dir}/{user}.lock` for the whole read-modify-write and
//! replace the data file by rename, so readers never see a torn write and
//! never need the lock themselves.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{validate_user, BufferError, BufferResult, KeepFn, RemoteBuffer, Subscription};
use crate::models::{BufferEntry, BufferRecord, QueueKey};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Buffer stored as one JSON file per user
#[derive(Debug, Clone)]
pub struct FileBuffer {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileBuffer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often subscriptions check the file for changes
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, user: &str) -> BufferResult<PathBuf> {
        validate_user(user)?;
        Ok(self.dir.join(format!("{}.json", user)))
    }

    fn lock_path(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", user))
    }

    /// Run a read-modify-write on the user's entries under the file lock
    async fn modify<T, F>(&self, user: &str, f: F) -> BufferResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<BufferEntry>) -> (T, bool) + Send + 'static,
    {
        let data_path = self.data_path(user)?;
        let lock_path = self.lock_path(user);
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir).map_err(|source| BufferError::Io {
                path: dir.clone(),
                source,
            })?;
            let lock = acquire_lock(&lock_path)?;

            let result = read_entries(&data_path).and_then(|mut entries| {
                let (value, changed) = f(&mut entries);
                if changed {
                    write_entries(&data_path, &entries)?;
                }
                Ok(value)
            });

            let _ = FileExt::unlock(&lock);
            result
        })
        .await
        .map_err(|e| BufferError::Task(e.to_string()))?
    }
}

#[async_trait]
impl RemoteBuffer for FileBuffer {
    async fn subscribe(&self, user: &str) -> BufferResult<Subscription> {
        let initial = self.snapshot(user).await?;
        let data_path = self.data_path(user)?;
        let (tx, rx) = watch::channel(initial);
        let interval = self.poll_interval;

        let poller = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    break;
                }

                let path = data_path.clone();
                match tokio::task::spawn_blocking(move || read_entries(&path)).await {
                    Ok(Ok(entries)) => {
                        tx.send_if_modified(|current| {
                            if *current == entries {
                                false
                            } else {
                                *current = entries;
                                true
                            }
                        });
                    }
                    Ok(Err(e)) => warn!("Failed to poll buffer: {}", e),
                    Err(e) => warn!("Buffer poll task failed: {}", e),
                }
            }
            debug!("Buffer poller for {:?} stopped", data_path);
        });

        Ok(Subscription::new(rx, Some(poller.abort_handle())))
    }

    async fn snapshot(&self, user: &str) -> BufferResult<Vec<BufferEntry>> {
        let path = self.data_path(user)?;
        tokio::task::spawn_blocking(move || read_entries(&path))
            .await
            .map_err(|e| BufferError::Task(e.to_string()))?
    }

    async fn push(&self, user: &str, record: BufferRecord) -> BufferResult<QueueKey> {
        self.modify(user, move |entries| {
            let prev = entries.iter().map(|e| &e.key).max();
            let key = QueueKey::next_after(prev, Utc::now());
            entries.push(BufferEntry::new(key.clone(), record));
            (key, true)
        })
        .await
    }

    async fn purge(&self, user: &str, keep: &KeepFn<'_>) -> BufferResult<usize> {
        // The predicate can't cross into the blocking task, so resolve it
        // against the live contents first and pass the surviving keys in.
        // Entries written between the two steps are kept.
        let live = self.snapshot(user).await?;
        let doomed: Vec<QueueKey> = live
            .iter()
            .filter(|e| !keep(*e))
            .map(|e| e.key.clone())
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        self.modify(user, move |entries| {
            let before = entries.len();
            entries.retain(|e| !doomed.contains(&e.key));
            let removed = before - entries.len();
            (removed, removed > 0)
        })
        .await
    }
}

fn acquire_lock(path: &Path) -> BufferResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| BufferError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
    file.lock_exclusive().map_err(|source| BufferError::Lock {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file)
}

fn read_entries(path: &Path) -> BufferResult<Vec<BufferEntry>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(BufferError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut entries: Vec<BufferEntry> =
        serde_json::from_slice(&raw).map_err(|source| BufferError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

fn write_entries(path: &Path, entries: &[BufferEntry]) -> BufferResult<()> {
    let io_err = |source| BufferError::Io {
        path: path.to_path_buf(),
        source,
    };

    let rendered = serde_json::to_vec_pretty(entries).map_err(|source| BufferError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path).map_err(io_err)?;
    file.write_all(&rendered).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_err)
}
