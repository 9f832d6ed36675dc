//! Note materialization
//!
//! Renders an event through the configured template and writes it to the
//! vault. New notes go to `{folder_path}/{title}.md`; events for notes that
//! already exist follow the configured update mode:
//!
//! - `new`: create `{title} V{n}.md` next to the existing notes
//! - `overwrite`: replace the note with the fresh rendering
//! - `append` / `prepend`: add a `#V{n}` marker and the new body only;
//!   prepending goes below the frontmatter so the note keeps its id
//!
//! `n` is one more than the number of notes already carrying the id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{Config, TemplateSource, UpdateMode};
use crate::error::{MaterializationError, RelayError};
use crate::models::NoteEvent;
use crate::resolver::ExistingNote;
use crate::template::{builtin_template, render, Placeholders};
use crate::vault::{frontmatter_len, Vault, VaultError};

/// Characters stripped from titles before they become file names
const RESERVED_CHARS: &[char] = &['\\', '/', ':', '*', '?', '\'', '"', '<', '>', '.', '|'];

/// Maximum file name length in bytes, excluding the `.md` extension
const MAX_NAME_BYTES: usize = 255 - 3;

const UNTITLED: &str = "Untitled";

/// What applying an event did to the vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First note for this id
    Created { path: PathBuf },
    /// Additional version-suffixed note (`new` mode)
    Versioned { path: PathBuf, version: usize },
    Overwritten { path: PathBuf },
    Appended { path: PathBuf, version: usize },
    Prepended { path: PathBuf, version: usize },
}

impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Outcome::Created { path }
            | Outcome::Versioned { path, .. }
            | Outcome::Overwritten { path }
            | Outcome::Appended { path, .. }
            | Outcome::Prepended { path, .. } => path,
        }
    }

    /// Whether a new note file was created
    pub fn created_note(&self) -> bool {
        matches!(self, Outcome::Created { .. } | Outcome::Versioned { .. })
    }
}

/// Writes note events into a vault
pub struct Materializer {
    vault: Arc<dyn Vault>,
    config: Config,
}

impl Materializer {
    pub fn new(vault: Arc<dyn Vault>, config: Config) -> Self {
        Self { vault, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply one event, given the note it resolved to (if any)
    pub async fn apply(
        &self,
        event: &NoteEvent,
        existing: Option<&ExistingNote>,
    ) -> Result<Outcome, RelayError> {
        let fail = |source: MaterializationError| RelayError::Materialization {
            id: event.id.clone(),
            source,
        };

        let template = self.load_template().await.map_err(fail)?;
        let values = Placeholders::new(event, &self.config).map_err(fail)?;
        let content = render(&template, &values);

        let Some(existing) = existing else {
            let path = self
                .create_unique(&event.title, &content, event)
                .await
                .map_err(|e| fail(e.into()))?;
            info!("Created note {:?} for {}", path, event.id);
            return Ok(Outcome::Created { path });
        };

        let version = existing.matches + 1;
        let newline = self.config.new_line_style.as_str();

        let outcome = match &self.config.update_mode {
            UpdateMode::New => {
                let title = format!("{} V{}", event.title, version);
                let path = self
                    .create_unique(&title, &content, event)
                    .await
                    .map_err(|e| fail(e.into()))?;
                Outcome::Versioned { path, version }
            }
            UpdateMode::Overwrite => {
                self.vault
                    .overwrite_note(&existing.path, &content)
                    .await
                    .map_err(|e| fail(e.into()))?;
                Outcome::Overwritten {
                    path: existing.path.clone(),
                }
            }
            UpdateMode::Append => {
                let current = self.read_existing(existing).await.map_err(fail)?;
                let updated = format!("{current}{newline}#V{version}{newline}{}", event.body);
                self.vault
                    .overwrite_note(&existing.path, &updated)
                    .await
                    .map_err(|e| fail(e.into()))?;
                Outcome::Appended {
                    path: existing.path.clone(),
                    version,
                }
            }
            UpdateMode::Prepend => {
                let current = self.read_existing(existing).await.map_err(fail)?;
                let (head, tail) = current.split_at(frontmatter_len(&current).unwrap_or(0));
                let mut updated = head.to_string();
                if !head.is_empty() && !head.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push_str(&format!("#V{version}{newline}{}{newline}{tail}", event.body));
                self.vault
                    .overwrite_note(&existing.path, &updated)
                    .await
                    .map_err(|e| fail(e.into()))?;
                Outcome::Prepended {
                    path: existing.path.clone(),
                    version,
                }
            }
            UpdateMode::Unknown(mode) => {
                return Err(RelayError::Configuration(format!(
                    "unknown update mode '{}' (expected overwrite, append, prepend or new)",
                    mode
                )));
            }
        };

        info!("Updated note for {}: {:?}", event.id, outcome);
        Ok(outcome)
    }

    async fn load_template(&self) -> Result<String, MaterializationError> {
        match self.config.template_source {
            TemplateSource::Builtin => Ok(builtin_template(self.config.tags_as_links).to_string()),
            TemplateSource::Custom => {
                let path = self.config.custom_template_path.as_ref().ok_or_else(|| {
                    MaterializationError::Template(
                        "custom template selected but custom_template_path is not set".to_string(),
                    )
                })?;
                self.vault.read_note(path).await.map_err(|e| {
                    MaterializationError::Template(format!(
                        "cannot read template {:?}: {}",
                        path, e
                    ))
                })
            }
        }
    }

    async fn read_existing(&self, existing: &ExistingNote) -> Result<String, MaterializationError> {
        Ok(self.vault.read_note(&existing.path).await?)
    }

    /// Create a note named after `title`, retrying once with a date suffix
    /// if the name collides or is rejected
    async fn create_unique(
        &self,
        title: &str,
        content: &str,
        event: &NoteEvent,
    ) -> Result<PathBuf, VaultError> {
        let path = self.note_path(title, None);
        match self.vault.create_note(&path, content).await {
            Ok(()) => Ok(path),
            Err(e) if e.is_collision() => {
                let suffix = event
                    .created_at
                    .at
                    .unwrap_or_else(Utc::now)
                    .format("%Y-%m-%d %H%M%S")
                    .to_string();
                let fallback = self.note_path(title, Some(&suffix));
                debug!("{}; retrying as {:?}", e, fallback);
                self.vault.create_note(&fallback, content).await?;
                Ok(fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Vault-relative path for a note title
    pub fn note_path(&self, title: &str, suffix: Option<&str>) -> PathBuf {
        let folder = self.config.folder_path.trim_matches('/');
        let file = format!("{}.md", file_stem(title, suffix));
        if folder.is_empty() {
            PathBuf::from(file)
        } else {
            Path::new(folder).join(file)
        }
    }
}

/// Turn a title into a file name stem
///
/// Reserved characters are stripped and the result is capped in bytes,
/// leaving room for the suffix so a disambiguated name never truncates back
/// into the original.
fn file_stem(title: &str, suffix: Option<&str>) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !RESERVED_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    let base = if cleaned.is_empty() { UNTITLED } else { cleaned };

    match suffix {
        None => truncate_bytes(base, MAX_NAME_BYTES).trim_end().to_string(),
        Some(suffix) => {
            let room = MAX_NAME_BYTES.saturating_sub(suffix.len() + 1);
            format!("{} {}", truncate_bytes(base, room).trim_end(), suffix)
        }
    }
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
