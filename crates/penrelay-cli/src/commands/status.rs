//! Status command handler

use anyhow::{Context, Result};

use penrelay_core::{Config, FileBuffer, RemoteBuffer};

use crate::output::{Output, OutputFormat};

/// Show where notes go and how many entries are waiting
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let buffer = FileBuffer::new(config.buffer_dir());
    let pending = buffer
        .snapshot(&config.user_id)
        .await
        .context("Failed to read the buffer")?;
    let oldest = pending.first().map(|e| e.key.to_string());

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "user_id": config.user_id,
                    "vault_dir": config.vault_dir,
                    "folder_path": config.folder_path,
                    "update_mode": config.update_mode.to_string(),
                    "buffer_dir": config.buffer_dir(),
                    "pending": pending.len(),
                    "oldest_key": oldest,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", pending.len());
        }
        OutputFormat::Human => {
            println!("penrelay Status");
            println!("===============");
            println!();
            println!("Vault:");
            println!("  Location:    {}", config.vault_dir.display());
            println!("  Folder:      {}", config.folder_path);
            println!("  Update mode: {}", config.update_mode);
            println!();
            println!("Buffer:");
            println!("  User:     {}", config.user_id);
            println!("  Location: {}", config.buffer_dir().display());
            println!("  Pending:  {}", pending.len());
            if let Some(key) = oldest {
                println!("  Oldest:   {}", key);
            }
        }
    }

    Ok(())
}
