//! Local note storage
//!
//! The vault is a directory of markdown notes with YAML frontmatter. The
//! relay only needs four operations from it, captured by the `Vault` trait:
//! list notes with their frontmatter, read one, create one (never clobbering),
//! and overwrite one.
//!
//! Paths handed to and returned from a vault are relative to its root.

mod error;
mod fs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_yaml::{Mapping, Value};

pub use error::{VaultError, VaultResult};
pub use fs::FsVault;

use crate::models::NOTE_ID_FIELD;

/// A note in the vault and its parsed frontmatter
#[derive(Debug, Clone, PartialEq)]
pub struct NoteMeta {
    pub path: PathBuf,
    pub frontmatter: Option<Mapping>,
}

impl NoteMeta {
    /// The note's logical identity, coerced to a string
    ///
    /// One platform sends numeric ids. `parse_frontmatter` keeps those as
    /// written; a number here came from a mapping built some other way.
    pub fn note_id(&self) -> Option<String> {
        let value = self.frontmatter.as_ref()?.get(NOTE_ID_FIELD)?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Storage the materializer writes notes into
#[async_trait]
pub trait Vault: Send + Sync {
    /// List every markdown note with its frontmatter, in a stable order
    async fn list_notes(&self) -> VaultResult<Vec<NoteMeta>>;

    async fn read_note(&self, path: &Path) -> VaultResult<String>;

    /// Create a note; fails with `AlreadyExists` if the path is taken
    async fn create_note(&self, path: &Path, content: &str) -> VaultResult<()>;

    async fn overwrite_note(&self, path: &Path, content: &str) -> VaultResult<()>;
}

/// Split YAML frontmatter from markdown content
///
/// Returns `None` when the note has no frontmatter block or it does not
/// parse as a mapping. A bare id such as `1e3` or `007` keeps its written
/// text instead of the value YAML would read it as.
pub fn parse_frontmatter(content: &str) -> Option<Mapping> {
    let (yaml, _) = split_frontmatter(content)?;
    if yaml.trim().is_empty() {
        return Some(Mapping::new());
    }

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mut map)) => {
            keep_written_id(&mut map, yaml);
            Some(map)
        }
        Ok(Value::Null) => Some(Mapping::new()),
        _ => None,
    }
}

/// Byte length of the leading frontmatter block, closing line included
///
/// `None` when the note does not open with a terminated block.
pub fn frontmatter_len(content: &str) -> Option<usize> {
    split_frontmatter(content).map(|(_, body_start)| body_start)
}

/// The frontmatter's YAML text and the offset where the note body starts
fn split_frontmatter(content: &str) -> Option<(&str, usize)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let yaml_len = if rest.starts_with("---") {
        0
    } else {
        rest.find("\n---")? + 1
    };

    let closer = &rest[yaml_len + 3..];
    let line_break = if closer.starts_with("\r\n") {
        2
    } else if closer.starts_with('\n') {
        1
    } else {
        0
    };

    Some((&rest[..yaml_len], content.len() - closer.len() + line_break))
}

fn keep_written_id(map: &mut Mapping, yaml: &str) {
    let retyped = matches!(
        map.get(NOTE_ID_FIELD),
        Some(Value::Number(_) | Value::Bool(_) | Value::Null)
    );
    if !retyped {
        return;
    }
    if let Some(text) = raw_scalar(yaml, NOTE_ID_FIELD) {
        map.insert(
            Value::String(NOTE_ID_FIELD.to_string()),
            Value::String(text.to_string()),
        );
    }
}

/// The plain scalar written after `key:` on a top-level line
fn raw_scalar<'a>(yaml: &'a str, key: &str) -> Option<&'a str> {
    yaml.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.trim_start().strip_prefix(':')?;
        let text = rest.find(" #").map_or(rest, |at| &rest[..at]).trim();
        (!text.is_empty()).then_some(text)
    })
}
