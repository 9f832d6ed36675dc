//! Run command handler

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use penrelay_core::{Config, Relay, Session};

use crate::output::Output;

/// Relay notes as they arrive until Ctrl-C
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let relay = Arc::new(Relay::open(config));
    let mut session = Session::start(relay, config.user_id.clone())
        .await
        .context("Failed to observe the remote buffer")?;

    output.message(&format!(
        "Relaying notes for '{}' into {} (Ctrl-C to stop)",
        config.user_id,
        config.vault_dir.display()
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = session.status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *session.status_rx.borrow_and_update();
                output.print_status(status);
            }

            notice = session.notices.recv() => match notice {
                Ok(notice) => output.print_notice(&notice),
                Err(RecvError::Lagged(missed)) => {
                    output.message(&format!("({} notices skipped)", missed));
                }
                Err(RecvError::Closed) => break,
            },
        }

        if session.is_finished() {
            break;
        }
    }

    output.message("Stopping...");
    session.shutdown().await;
    Ok(())
}
