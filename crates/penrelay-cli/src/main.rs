//! penrelay CLI
//!
//! Command-line interface for penrelay: relay voice notes from the remote
//! buffer into a markdown vault.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use penrelay_core::{Config, Platform};

mod commands;
mod logging;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "penrelay")]
#[command(about = "penrelay - Relay voice notes into your markdown vault")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (overrides default and PENRELAY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the buffer and relay notes until interrupted
    Run,
    /// Relay whatever is in the buffer now, then exit
    Drain,
    /// Validate a note payload and add it to the buffer
    Push(PushArgs),
    /// Show configuration summary and pending entries
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args)]
struct PushArgs {
    /// Read the JSON payload from a file ("-" for stdin)
    #[arg(long, conflicts_with_all = ["id", "title", "body", "tags", "date"])]
    json_file: Option<PathBuf>,

    /// Note id
    #[arg(long)]
    id: Option<String>,

    /// Note title
    #[arg(short = 'T', long)]
    title: Option<String>,

    /// Note body
    #[arg(short, long)]
    body: Option<String>,

    /// Comma-separated tags
    #[arg(short, long)]
    tags: Option<String>,

    /// Creation date (defaults to now)
    #[arg(long)]
    date: Option<String>,

    /// Source platform (audiopen, voicenotes)
    #[arg(long, default_value = "audiopen")]
    platform: Platform,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (vault_dir, update_mode, folder_path, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work even when the config file is broken
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    logging::init(&config);

    match cli.command {
        Commands::Run => commands::run::run(&config, &output).await,
        Commands::Drain => commands::drain::drain(&config, &output).await,
        Commands::Push(args) => {
            let payload = match args.json_file {
                Some(path) => commands::push::read_payload(&path)?,
                // Nothing on the command line: expect the payload on stdin
                None if args.id.is_none() => commands::push::read_payload(Path::new("-"))?,
                None => commands::push::payload_from_flags(
                    args.id,
                    args.title,
                    args.body,
                    args.tags,
                    args.date,
                    args.platform,
                )?,
            };
            commands::push::push(&config, payload, args.platform, &output).await
        }
        Commands::Status => commands::status::show(&config, &output).await,
        Commands::Config { .. } => Ok(()), // Handled above
    }
}
