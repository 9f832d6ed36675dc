//! Note identity resolution
//!
//! Maps a logical note id to the vault notes carrying it in their
//! frontmatter. The index is built from one vault listing at the start of a
//! batch and updated after every write, so later events in the same batch
//! see the notes earlier events created.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::vault::{NoteMeta, Vault, VaultResult};

/// An already-materialized note for some id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingNote {
    /// The first matching note in vault order
    pub path: PathBuf,
    /// How many notes share the id
    pub matches: usize,
}

impl ExistingNote {
    pub fn is_ambiguous(&self) -> bool {
        self.matches > 1
    }
}

/// In-memory index from note identity to vault paths
#[derive(Debug, Default)]
pub struct NoteIndex {
    by_id: HashMap<String, Vec<PathBuf>>,
}

impl NoteIndex {
    /// Build the index from a vault listing
    pub fn build(notes: &[NoteMeta]) -> Self {
        let mut index = Self::default();
        for note in notes {
            if let Some(id) = note.note_id() {
                index.record(&id, &note.path);
            }
        }
        index
    }

    /// List the vault and index it
    pub async fn load(vault: &dyn Vault) -> VaultResult<Self> {
        let notes = vault.list_notes().await?;
        Ok(Self::build(&notes))
    }

    /// Find the note for `id`, if one exists
    ///
    /// When several notes match, the first is returned and the ambiguity is
    /// logged; callers decide whether to surface it further.
    pub fn resolve(&self, id: &str) -> Option<ExistingNote> {
        let paths = self.by_id.get(id)?;
        let first = paths.first()?;

        if paths.len() > 1 {
            warn!(
                "{} notes share id {}; using {:?}",
                paths.len(),
                id,
                first
            );
        }

        Some(ExistingNote {
            path: first.clone(),
            matches: paths.len(),
        })
    }

    /// Number of notes carrying `id`
    pub fn count(&self, id: &str) -> usize {
        self.by_id.get(id).map_or(0, Vec::len)
    }

    /// Record a note written under `id`
    pub fn record(&mut self, id: &str, path: &Path) {
        let paths = self.by_id.entry(id.to_string()).or_default();
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
    }

    /// Number of distinct ids indexed
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
