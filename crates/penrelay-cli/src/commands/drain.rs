//! Drain command handler

use anyhow::{bail, Result};

use penrelay_core::{Config, Relay};

use crate::output::Output;

/// Relay the current buffer contents once
///
/// Fails (non-zero exit) when the batch did not complete, after printing
/// what was applied.
pub async fn drain(config: &Config, output: &Output) -> Result<()> {
    let relay = Relay::open(config);
    let report = relay.drain(&config.user_id).await?;

    output.print_report(&report);

    if let Some(e) = report.error {
        bail!("Batch failed: {}", e);
    }
    Ok(())
}
