//! Config command handlers

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use penrelay_core::{Config, NewLineStyle, TemplateSource, UpdateMode};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.vault_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  vault_dir:            {}", config.vault_dir.display());
            println!("  user_id:              {}", config.user_id);
            println!("  folder_path:          {}", config.folder_path);
            println!("  update_mode:          {}", config.update_mode);
            println!("  new_line_style:       {}", config.new_line_style);
            println!("  tags_as_links:        {}", config.tags_as_links);
            println!("  link_property:        {}", config.link_property);
            println!("  template_source:      {}", config.template_source);
            println!(
                "  custom_template_path: {}",
                display_optional(config.custom_template_path.as_ref())
            );
            println!("  date_format:          {}", config.date_format);
            println!("  poll_interval_ms:     {}", config.poll_interval_ms);
            println!(
                "  log_file:             {}",
                display_optional(config.log_file.as_ref())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, key, value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "vault_dir" => config.vault_dir = value.into(),
        "user_id" => {
            if value.is_empty() {
                bail!("user_id cannot be empty");
            }
            config.user_id = value.to_string();
        }
        "folder_path" => config.folder_path = value.to_string(),
        "update_mode" => {
            let mode = UpdateMode::from(value.to_string());
            if let UpdateMode::Unknown(_) = mode {
                bail!("Invalid value for update_mode. Use overwrite, append, prepend or new.");
            }
            config.update_mode = mode;
        }
        "new_line_style" => {
            config.new_line_style = value.parse::<NewLineStyle>().map_err(|e| anyhow!(e))?;
        }
        "tags_as_links" => {
            config.tags_as_links = value
                .parse()
                .context("Invalid value for tags_as_links. Use 'true' or 'false'.")?;
        }
        "link_property" => config.link_property = value.to_string(),
        "template_source" => {
            config.template_source = value.parse::<TemplateSource>().map_err(|e| anyhow!(e))?;
        }
        "custom_template_path" => config.custom_template_path = optional_path(value),
        "date_format" => config.date_format = value.to_string(),
        "poll_interval_ms" => {
            config.poll_interval_ms = value
                .parse()
                .context("Invalid value for poll_interval_ms. Use a number of milliseconds.")?;
        }
        "log_file" => config.log_file = optional_path(value),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, vault_dir, user_id, folder_path, update_mode, \
                 new_line_style, tags_as_links, link_property, template_source, \
                 custom_template_path, date_format, poll_interval_ms, log_file",
                key
            );
        }
    }
    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.into())
    }
}

fn display_optional(path: Option<&PathBuf>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}
