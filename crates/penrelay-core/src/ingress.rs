//! Ingress validation
//!
//! Checks a raw webhook payload before it is pushed to the remote buffer,
//! and shapes it into a `BufferRecord`. Accepted records expire seven days
//! after the day they were received; the relay itself ignores the expiry.

use chrono::{DateTime, Days, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{BufferRecord, Platform};

const EXPIRY_DAYS: u64 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IngressError {
    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Invalid payload: {0}")]
    InvalidField(String),
}

/// Validate `payload` for `platform` and wrap it for the buffer
pub fn build_record(
    payload: Value,
    platform: Platform,
    now: DateTime<Utc>,
) -> Result<BufferRecord, IngressError> {
    let Value::Object(mut data) = payload else {
        return Err(IngressError::NotAnObject);
    };

    match platform {
        Platform::AudioPen => {
            for field in ["id", "title", "body", "orig_transcript"] {
                require_string(&data, field)?;
            }
        }
        Platform::VoiceNotes => {
            match data.get("id") {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::Number(_)) => {}
                _ => {
                    return Err(IngressError::InvalidField(
                        "id must be a non-empty string or a number".to_string(),
                    ))
                }
            }
            require_string(&data, "transcript")?;
            optional_string(&data, "title")?;
        }
    }

    let tags = split_tags(data.remove("tags"))?;
    data.insert("tags".to_string(), tags);

    Ok(BufferRecord {
        platform: Some(platform),
        exp: expiry(now),
        data: Some(Value::Object(data)),
    })
}

fn require_string(data: &Map<String, Value>, field: &str) -> Result<(), IngressError> {
    match data.get(field) {
        Some(Value::String(_)) => Ok(()),
        _ => Err(IngressError::InvalidField(format!(
            "{} is required and must be a string",
            field
        ))),
    }
}

fn optional_string(data: &Map<String, Value>, field: &str) -> Result<(), IngressError> {
    match data.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        _ => Err(IngressError::InvalidField(format!("{} must be a string", field))),
    }
}

/// Comma-separated tag strings become lists; lists pass through
fn split_tags(tags: Option<Value>) -> Result<Value, IngressError> {
    match tags {
        None | Some(Value::Null) => Ok(Value::Array(Vec::new())),
        Some(Value::String(s)) => Ok(Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| Value::String(t.to_string()))
                .collect(),
        )),
        Some(list @ Value::Array(_)) => Ok(list),
        Some(_) => Err(IngressError::InvalidField(
            "tags must be a list or a comma-separated string".to_string(),
        )),
    }
}

/// Midnight UTC, seven days after `now`'s date
fn expiry(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.date_naive()
        .checked_add_days(Days::new(EXPIRY_DAYS))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_audiopen_payload_accepted() {
        let record = build_record(
            json!({
                "id": "n1",
                "title": "Hello",
                "body": "World",
                "orig_transcript": "uh world",
                "tags": "a, b,",
                "date_created": "2024-01-01"
            }),
            Platform::AudioPen,
            now(),
        )
        .unwrap();

        assert_eq!(record.platform, Some(Platform::AudioPen));
        assert_eq!(
            record.exp,
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap())
        );
        let data = record.data.unwrap();
        assert_eq!(data["tags"], json!(["a", "b"]));
        assert_eq!(data["date_created"], "2024-01-01");
    }

    #[test]
    fn test_audiopen_requires_string_fields() {
        let err = build_record(
            json!({"id": "n1", "title": "Hello", "body": 5, "orig_transcript": ""}),
            Platform::AudioPen,
            now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("body"));

        let err = build_record(
            json!({"id": "n1", "title": "Hello", "body": "x"}),
            Platform::AudioPen,
            now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("orig_transcript"));
    }

    #[test]
    fn test_voicenotes_payload_accepted() {
        let record = build_record(
            json!({"id": 42, "transcript": "hi", "tags": ["x"]}),
            Platform::VoiceNotes,
            now(),
        )
        .unwrap();
        assert_eq!(record.data.unwrap()["tags"], json!(["x"]));
    }

    #[test]
    fn test_voicenotes_requires_id() {
        let err = build_record(json!({"transcript": "hi"}), Platform::VoiceNotes, now()).unwrap_err();
        assert!(matches!(err, IngressError::InvalidField(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(
            build_record(json!([1, 2]), Platform::AudioPen, now()).unwrap_err(),
            IngressError::NotAnObject
        );
    }

    #[test]
    fn test_bad_tags_rejected() {
        let err = build_record(
            json!({"id": "n1", "title": "", "body": "", "orig_transcript": "", "tags": 3}),
            Platform::AudioPen,
            now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("tags"));
    }
}
