//! Filesystem-backed vault
//!
//! Notes are plain `.md` files under a root directory. Hidden directories
//! (`.obsidian`, `.trash`, ...) are skipped when listing. Overwrites are
//! atomic (write to temp file, then rename) so a crash never leaves a
//! half-written note behind.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::{parse_frontmatter, NoteMeta, Vault, VaultError, VaultResult};

/// Vault rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a vault-relative path, rejecting anything that escapes the root
    fn full_path(&self, path: &Path) -> VaultResult<PathBuf> {
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.as_os_str().is_empty() {
            return Err(VaultError::InvalidName {
                path: path.to_path_buf(),
                reason: "note paths must be relative to the vault root".to_string(),
            });
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn list_notes(&self) -> VaultResult<Vec<NoteMeta>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan(&root))
            .await
            .map_err(|e| VaultError::Scan(e.to_string()))
    }

    async fn read_note(&self, path: &Path) -> VaultResult<String> {
        let full = self.full_path(path)?;
        fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VaultError::NotFound {
                path: path.to_path_buf(),
            },
            _ => VaultError::ReadError {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }

    async fn create_note(&self, path: &Path, content: &str) -> VaultResult<()> {
        let full = self.full_path(path)?;
        ensure_parent(&full, path).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| VaultError::from_io(e, path.to_path_buf()))?;

        let written = match file.write_all(content.as_bytes()).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);
        keep_if_written(&full, path, written).await?;

        debug!("Created note {:?}", path);
        Ok(())
    }

    async fn overwrite_note(&self, path: &Path, content: &str) -> VaultResult<()> {
        let full = self.full_path(path)?;
        ensure_parent(&full, path).await?;
        atomic_write(&full, content.as_bytes())
            .await
            .map_err(|e| VaultError::from_io(e, path.to_path_buf()))?;

        debug!("Overwrote note {:?}", path);
        Ok(())
    }
}

async fn ensure_parent(full: &Path, path: &Path) -> VaultResult<()> {
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| VaultError::from_io(e, path.to_path_buf()))?;
    }
    Ok(())
}

/// Keep a freshly created note only if it was written in full
///
/// A partial note would read as a collision, or as a truncated note, the
/// next time the event is applied.
async fn keep_if_written(full: &Path, path: &Path, written: io::Result<()>) -> VaultResult<()> {
    let Err(e) = written else {
        return Ok(());
    };
    if let Err(cleanup) = fs::remove_file(full).await {
        warn!("Could not remove partial note {:?}: {}", path, cleanup);
    }
    Err(VaultError::from_io(e, path.to_path_buf()))
}

/// Walk the vault and collect every markdown note with its frontmatter
fn scan(root: &Path) -> Vec<NoteMeta> {
    if !root.exists() {
        return Vec::new();
    }

    let mut notes = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable vault entry: {}", e);
                continue;
            }
        };

        let is_markdown = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "md");
        if !is_markdown {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };

        let frontmatter = match std::fs::read_to_string(entry.path()) {
            Ok(content) => parse_frontmatter(&content),
            Err(e) => {
                warn!("Could not read {:?} while indexing: {}", relative, e);
                None
            }
        };

        notes.push(NoteMeta {
            path: relative.to_path_buf(),
            frontmatter,
        });
    }

    notes
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
async fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        let path = Path::new("AudioPen/Hello.md");
        vault.create_note(path, "---\naudioPenID: n1\n---\nWorld").await.unwrap();

        let content = vault.read_note(path).await.unwrap();
        assert!(content.ends_with("World"));
    }

    #[tokio::test]
    async fn test_create_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        let path = Path::new("Hello.md");
        vault.create_note(path, "first").await.unwrap();
        let err = vault.create_note(path, "second").await.unwrap_err();

        assert!(err.is_collision());
        assert_eq!(vault.read_note(path).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_partial_note() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());
        let path = Path::new("Hello.md");
        let full = temp_dir.path().join(path);
        std::fs::write(&full, "---\naudioPen").unwrap();

        let failed = Err(io::Error::new(io::ErrorKind::Other, "device error"));
        let err = keep_if_written(&full, path, failed).await.unwrap_err();

        assert!(!err.is_collision());
        assert!(!full.exists());
        vault.create_note(path, "complete").await.unwrap();
        assert_eq!(vault.read_note(path).await.unwrap(), "complete");

        keep_if_written(&full, path, Ok(())).await.unwrap();
        assert!(full.exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        let path = Path::new("Hello.md");
        vault.create_note(path, "first").await.unwrap();
        vault.overwrite_note(path, "second").await.unwrap();

        assert_eq!(vault.read_note(path).await.unwrap(), "second");
        assert!(!temp_dir.path().join("Hello.tmp").exists());
    }

    #[tokio::test]
    async fn test_list_notes_reads_frontmatter() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        vault
            .create_note(Path::new("b/Two.md"), "---\naudioPenID: 42\n---\n")
            .await
            .unwrap();
        vault
            .create_note(Path::new("a/One.md"), "---\naudioPenID: n1\n---\n")
            .await
            .unwrap();
        vault
            .create_note(Path::new("plain.txt"), "not a note")
            .await
            .unwrap();
        std::fs::create_dir_all(temp_dir.path().join(".obsidian")).unwrap();
        std::fs::write(
            temp_dir.path().join(".obsidian/hidden.md"),
            "---\naudioPenID: n1\n---\n",
        )
        .unwrap();

        let notes = vault.list_notes().await.unwrap();
        let paths: Vec<_> = notes.iter().map(|n| n.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("a/One.md"), PathBuf::from("b/Two.md")]
        );
        assert_eq!(notes[0].note_id().as_deref(), Some("n1"));
        assert_eq!(notes[1].note_id().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_list_notes_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path().join("not-yet"));
        assert!(vault.list_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        let err = vault
            .create_note(Path::new("../outside.md"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidName { .. }));

        let err = vault.read_note(Path::new("/etc/passwd")).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidName { .. }));
    }

    #[tokio::test]
    async fn test_read_missing_note() {
        let temp_dir = TempDir::new().unwrap();
        let vault = FsVault::new(temp_dir.path());

        let err = vault.read_note(Path::new("nope.md")).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound { .. }));
    }
}
