//! Push command handler
//!
//! Plays the ingress role locally: validates a payload and appends it to the
//! user's buffer, where a running relay (or the next drain) picks it up.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{json, Value};

use penrelay_core::{build_record, Config, FileBuffer, Platform, RemoteBuffer};

use crate::output::{Output, OutputFormat};

/// Read a JSON payload from a file, or stdin for "-"
pub fn read_payload(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read payload from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file: {:?}", path))?
    };

    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

/// Build a payload in the platform's shape from command-line fields
pub fn payload_from_flags(
    id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    tags: Option<String>,
    date: Option<String>,
    platform: Platform,
) -> Result<Value> {
    let Some(id) = id else {
        bail!("--id is required unless the payload comes from --json-file or stdin");
    };
    let title = title.unwrap_or_default();
    let body = body.unwrap_or_default();
    let tags = tags.unwrap_or_default();
    let date = date.unwrap_or_else(|| Utc::now().to_rfc3339());

    let payload = match platform {
        Platform::AudioPen => json!({
            "id": id,
            "title": title,
            "body": body,
            "orig_transcript": body,
            "tags": tags,
            "date_created": date,
        }),
        Platform::VoiceNotes => json!({
            "id": id,
            "title": title,
            "transcript": body,
            "tags": tags,
            "created_at": date,
        }),
    };
    Ok(payload)
}

/// Validate and append a payload to the configured user's buffer
pub async fn push(
    config: &Config,
    payload: Value,
    platform: Platform,
    output: &Output,
) -> Result<()> {
    let record = build_record(payload, platform, Utc::now())?;
    let buffer = FileBuffer::new(config.buffer_dir());
    let key = buffer
        .push(&config.user_id, record)
        .await
        .context("Failed to write to the buffer")?;

    match output.format {
        OutputFormat::Quiet => println!("{}", key),
        _ => output.success(&format!("Queued entry {} for '{}'", key, config.user_id)),
    }
    Ok(())
}
