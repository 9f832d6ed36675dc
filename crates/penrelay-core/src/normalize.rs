//! Event normalization
//!
//! Turns a raw buffer record into a canonical `NoteEvent`. All the
//! per-platform differences are resolved here, once:
//!
//! | field        | audiopen          | voicenotes                  |
//! |--------------|-------------------|-----------------------------|
//! | body         | `body`            | `transcript` (normalized)   |
//! | created date | `date_created`    | `timestamp` / `created_at`  |
//! | id           | string            | string or number            |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::models::{BufferEntry, CreatedAt, NoteEvent, Platform, QueueKey};

/// Naive formats tried after RFC 3339 / RFC 2822, interpreted as UTC
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Epoch values at or above this are milliseconds, below are seconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize one buffer entry
///
/// Fails with `RelayError::Validation` when the entry has no payload, no
/// usable id, or a field of the wrong type.
pub fn normalize(entry: &BufferEntry) -> Result<NoteEvent, RelayError> {
    let key = &entry.key;
    let payload = match entry.record.data.as_ref() {
        None | Some(Value::Null) => {
            return Err(RelayError::validation(key, "entry has no payload"));
        }
        Some(Value::Object(map)) => map,
        Some(_) => return Err(RelayError::validation(key, "payload is not an object")),
    };

    let platform = entry.record.platform.unwrap_or_default();
    let id = note_id(payload, key)?;
    let title = optional_string(payload, "title", key)?.unwrap_or_default();
    let tags = parse_tags(payload.get("tags"), key)?;

    let event = match platform {
        Platform::AudioPen => NoteEvent {
            id,
            title,
            body: optional_string(payload, "body", key)?.unwrap_or_default(),
            transcript: None,
            original_transcript: optional_string(payload, "orig_transcript", key)?,
            tags,
            created_at: parse_created(payload.get("date_created")),
            platform,
            queue_key: key.clone(),
        },
        Platform::VoiceNotes => {
            let transcript = optional_string(payload, "transcript", key)?;
            let body = match optional_string(payload, "body", key)? {
                Some(body) => body,
                None => transcript
                    .as_deref()
                    .map(normalize_transcript)
                    .unwrap_or_default(),
            };
            let original_transcript = match optional_string(payload, "original_transcript", key)? {
                Some(original) => Some(original),
                None => optional_string(payload, "orig_transcript", key)?,
            };
            let created = payload
                .get("timestamp")
                .filter(|v| !v.is_null())
                .or_else(|| payload.get("created_at"));

            NoteEvent {
                id,
                title,
                body,
                transcript,
                original_transcript,
                tags,
                created_at: parse_created(created),
                platform,
                queue_key: key.clone(),
            }
        }
    };

    Ok(event)
}

/// Extract the logical note id, coercing numbers to strings
fn note_id(payload: &Map<String, Value>, key: &QueueKey) -> Result<String, RelayError> {
    let id = match payload.get("id") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        None | Some(Value::Null) => String::new(),
        Some(_) => return Err(RelayError::validation(key, "id must be a string or number")),
    };

    if id.is_empty() {
        return Err(RelayError::validation(key, "missing note id"));
    }
    Ok(id)
}

fn optional_string(
    payload: &Map<String, Value>,
    field: &str,
    key: &QueueKey,
) -> Result<Option<String>, RelayError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RelayError::validation(
            key,
            format!("{} must be a string", field),
        )),
    }
}

/// Tags arrive as a list (of names or `{name}` objects) or a comma-separated string
fn parse_tags(value: Option<&Value>, key: &QueueKey) -> Result<Vec<String>, RelayError> {
    let tags = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(_) => {
            return Err(RelayError::validation(
                key,
                "tags must be a list or a comma-separated string",
            ))
        }
    };

    Ok(tags.into_iter().filter(|t| !t.is_empty()).collect())
}

fn parse_created(value: Option<&Value>) -> CreatedAt {
    match value {
        None | Some(Value::Null) => CreatedAt::new("", None),
        Some(Value::String(s)) => CreatedAt::new(s.clone(), parse_date_text(s)),
        Some(Value::Number(n)) => {
            let at = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .and_then(from_epoch);
            CreatedAt::new(n.to_string(), at)
        }
        Some(other) => CreatedAt::new(other.to_string(), None),
    }
}

/// Parse the date representations the platforms are known to send
pub fn parse_date_text(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    raw.parse::<i64>().ok().and_then(from_epoch)
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::<Utc>::from_timestamp_millis(value)
    } else {
        DateTime::<Utc>::from_timestamp(value, 0)
    }
}

/// Transcripts use HTML breaks and mixed line endings; reduce them to `\n`
fn normalize_transcript(transcript: &str) -> String {
    transcript
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("<br />", "\n")
        .replace("<br/>", "\n")
        .replace("<br>", "\n")
        .trim_end()
        .to_string()
}
