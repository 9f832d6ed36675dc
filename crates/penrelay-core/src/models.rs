//! Data models for penrelay
//!
//! Defines the records stored in the remote buffer and the canonical
//! `NoteEvent` every other component works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frontmatter field that carries a note's logical identity
pub const NOTE_ID_FIELD: &str = "audioPenID";

/// Identity of one buffer entry (not of the note it describes)
///
/// Keys are zero-padded microsecond timestamps, so lexicographic order is
/// arrival order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(String);

impl QueueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a key strictly greater than `prev`
    ///
    /// Uses the current time unless the clock is behind the previous key
    /// (clock skew, or several pushes in the same microsecond).
    pub fn next_after(prev: Option<&QueueKey>, now: DateTime<Utc>) -> Self {
        let now = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let floor = prev
            .and_then(|key| key.0.parse::<u64>().ok())
            .map(|p| p.saturating_add(1))
            .unwrap_or(0);
        Self(format!("{:020}", now.max(floor)))
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for QueueKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for QueueKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source platform a note was captured on
///
/// The platforms deliver differently shaped payloads; the normalizer
/// reduces both to one `NoteEvent` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Delivers `body`, `orig_transcript` and a `date_created` string
    #[default]
    AudioPen,
    /// Delivers `transcript` and a `timestamp` (epoch or ISO string)
    VoiceNotes,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AudioPen => "audiopen",
            Platform::VoiceNotes => "voicenotes",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audiopen" => Ok(Platform::AudioPen),
            "voicenotes" => Ok(Platform::VoiceNotes),
            other => Err(format!(
                "unknown platform '{}' (expected audiopen or voicenotes)",
                other
            )),
        }
    }
}

/// A record as written to the remote buffer by the ingress webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferRecord {
    /// Missing on records written before multi-platform support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Expiry set by ingress; informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<DateTime<Utc>>,
    /// The raw note payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl BufferRecord {
    pub fn new(platform: Platform, data: serde_json::Value) -> Self {
        Self {
            platform: Some(platform),
            exp: None,
            data: Some(data),
        }
    }
}

/// One entry of the remote buffer: a record plus its queue key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferEntry {
    pub key: QueueKey,
    pub record: BufferRecord,
}

impl BufferEntry {
    pub fn new(key: impl Into<QueueKey>, record: BufferRecord) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }
}

/// Creation date as delivered, plus its parsed instant when recognizable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAt {
    /// The value exactly as the platform sent it (rendered as `{date_created}`)
    pub raw: String,
    /// Parsed instant; `None` when the platform sent something unrecognizable
    pub at: Option<DateTime<Utc>>,
}

impl CreatedAt {
    pub fn new(raw: impl Into<String>, at: Option<DateTime<Utc>>) -> Self {
        Self {
            raw: raw.into(),
            at,
        }
    }
}

/// Canonical note event, produced by the normalizer
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Logical note identity, stable across revisions
    pub id: String,
    pub title: String,
    /// Platform-appropriate body (transcripts already newline-normalized)
    pub body: String,
    /// Raw transcript for platforms that deliver one instead of a body
    pub transcript: Option<String>,
    pub original_transcript: Option<String>,
    pub tags: Vec<String>,
    pub created_at: CreatedAt,
    pub platform: Platform,
    /// The buffer entry this event came from
    pub queue_key: QueueKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_queue_key_uses_clock() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let key = QueueKey::next_after(None, now);
        assert_eq!(key.as_str().len(), 20);
        assert_eq!(key.as_str().parse::<i64>().unwrap(), now.timestamp_micros());
    }

    #[test]
    fn test_queue_key_strictly_increasing() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = QueueKey::next_after(None, now);
        let second = QueueKey::next_after(Some(&first), now);
        let third = QueueKey::next_after(Some(&second), now - chrono::Duration::seconds(5));
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn test_queue_key_ignores_foreign_prev() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let key = QueueKey::next_after(Some(&QueueKey::from("-Nabc")), now);
        assert_eq!(key.as_str().parse::<i64>().unwrap(), now.timestamp_micros());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("AudioPen".parse::<Platform>().unwrap(), Platform::AudioPen);
        assert_eq!("voicenotes".parse::<Platform>().unwrap(), Platform::VoiceNotes);
        assert!("fax".parse::<Platform>().is_err());
    }

    #[test]
    fn test_buffer_record_legacy_shape() {
        let json = r#"{"id":"abc","exp":"2024-01-08T00:00:00Z","data":{"id":"n1"}}"#;
        let record: BufferRecord = serde_json::from_str(json).unwrap();
        assert!(record.platform.is_none());
        assert!(record.exp.is_some());
        assert_eq!(record.data.unwrap()["id"], "n1");
    }
}
