//! Note templates
//!
//! Templates are markdown with `{placeholder}` tokens:
//!
//! - `{title}`, `{body}`, `{orig_transcript}`, `{id}`, `{platform}`
//! - `{yaml_id}`: the id as a frontmatter value, quoted when YAML would
//!   otherwise read it back as something else (`1e3`, `true`, `a: b`)
//! - `{date_created}`: the date as delivered
//! - `{date_formatted}`: the date in the configured day-note format
//! - `{linkProperty}`: the frontmatter property holding tag links
//! - `{tagsAsLinks}` / `{tagsAsTags}`: tag bullets; only the configured one
//!   is non-empty
//!
//! Substitution is a single pass, so braces inside substituted values
//! (a body mentioning `{id}`, say) are never expanded. Unknown tokens are
//! left as written.

use std::fmt::Write;

use serde_yaml::Value;

use crate::config::Config;
use crate::error::MaterializationError;
use crate::models::NoteEvent;

/// Built-in template rendering tags as `[[links]]` under `{linkProperty}`
pub const LINKS_TEMPLATE: &str = include_str!("../templates/links.md");

/// Built-in template rendering tags as plain frontmatter tags
pub const TAGS_TEMPLATE: &str = include_str!("../templates/tags.md");

/// Values substituted into a template for one event
#[derive(Debug, Clone)]
pub struct Placeholders {
    title: String,
    body: String,
    orig_transcript: String,
    id: String,
    yaml_id: String,
    date_created: String,
    date_formatted: String,
    link_property: String,
    tags_as_links: String,
    tags_as_tags: String,
    platform: String,
}

impl Placeholders {
    pub fn new(event: &NoteEvent, config: &Config) -> Result<Self, MaterializationError> {
        let date_formatted = match event.created_at.at {
            Some(at) => {
                let mut out = String::new();
                write!(out, "{}", at.format(&config.date_format)).map_err(|_| {
                    MaterializationError::Template(format!(
                        "invalid date_format '{}'",
                        config.date_format
                    ))
                })?;
                out
            }
            None => event.created_at.raw.clone(),
        };

        let (tags_as_links, tags_as_tags) = if config.tags_as_links {
            (link_bullets(&event.tags), String::new())
        } else {
            (String::new(), plain_bullets(&event.tags))
        };

        let link_property = if config.link_property.trim().is_empty() {
            "x".to_string()
        } else {
            config.link_property.clone()
        };

        Ok(Self {
            title: event.title.clone(),
            body: event.body.clone(),
            orig_transcript: event.original_transcript.clone().unwrap_or_default(),
            id: event.id.clone(),
            yaml_id: yaml_scalar(&event.id),
            date_created: event.created_at.raw.clone(),
            date_formatted,
            link_property,
            tags_as_links,
            tags_as_tags,
            platform: event.platform.to_string(),
        })
    }

    fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title" => &self.title,
            "body" => &self.body,
            "orig_transcript" => &self.orig_transcript,
            "id" => &self.id,
            "yaml_id" => &self.yaml_id,
            "date_created" => &self.date_created,
            "date_formatted" => &self.date_formatted,
            "linkProperty" => &self.link_property,
            "tagsAsLinks" => &self.tags_as_links,
            "tagsAsTags" => &self.tags_as_tags,
            "platform" => &self.platform,
            _ => return None,
        };
        Some(value)
    }
}

/// Substitute placeholders into `template`
pub fn render(template: &str, values: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len() + values.body.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let token = after
            .find('}')
            .and_then(|end| values.get(&after[..end]).map(|value| (end, value)));

        match token {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// The built-in template matching the tag rendering style
pub fn builtin_template(tags_as_links: bool) -> &'static str {
    if tags_as_links {
        LINKS_TEMPLATE
    } else {
        TAGS_TEMPLATE
    }
}

/// Write `text` so a YAML parser reads it back as exactly that string
fn yaml_scalar(text: &str) -> String {
    let reads_back = serde_yaml::from_str::<Value>(&format!("k: {}", text))
        .ok()
        .and_then(|doc| doc.get("k").and_then(Value::as_str).map(|s| s == text))
        .unwrap_or(false);

    if reads_back {
        text.to_string()
    } else {
        // A JSON string is a valid YAML double-quoted scalar
        serde_json::Value::String(text.to_string()).to_string()
    }
}

fn link_bullets(tags: &[String]) -> String {
    bullets(tags, |tag| format!("  - \"[[{}]]\"", tag))
}

fn plain_bullets(tags: &[String]) -> String {
    bullets(tags, |tag| format!("  - {}", tag))
}

fn bullets(tags: &[String], line: impl Fn(&str) -> String) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(line)
        .collect::<Vec<_>>()
        .join("\n")
}
