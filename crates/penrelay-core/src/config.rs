//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/penrelay/config.toml)
//! 3. Environment variables (PENRELAY_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "PENRELAY";

/// How an event for an already-materialized note is reconciled
///
/// Unknown values are kept rather than rejected at load time; applying them
/// fails with a configuration error for the affected batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpdateMode {
    /// Replace the note with the freshly rendered template
    Overwrite,
    /// Append a version marker and the new body
    Append,
    /// Prepend a version marker and the new body
    Prepend,
    /// Always create a new, version-suffixed note
    #[default]
    New,
    /// Anything else found in the configuration
    Unknown(String),
}

impl From<String> for UpdateMode {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "overwrite" => UpdateMode::Overwrite,
            "append" => UpdateMode::Append,
            "prepend" => UpdateMode::Prepend,
            "new" => UpdateMode::New,
            _ => UpdateMode::Unknown(value),
        }
    }
}

impl From<UpdateMode> for String {
    fn from(mode: UpdateMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Overwrite => f.write_str("overwrite"),
            UpdateMode::Append => f.write_str("append"),
            UpdateMode::Prepend => f.write_str("prepend"),
            UpdateMode::New => f.write_str("new"),
            UpdateMode::Unknown(other) => f.write_str(other),
        }
    }
}

/// Separator inserted between appended or prepended segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewLineStyle {
    #[default]
    None,
    Crlf,
    Lf,
}

impl NewLineStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewLineStyle::None => "",
            NewLineStyle::Crlf => "\r\n",
            NewLineStyle::Lf => "\n",
        }
    }
}

impl FromStr for NewLineStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(NewLineStyle::None),
            "crlf" | "windows" => Ok(NewLineStyle::Crlf),
            "lf" | "unix" => Ok(NewLineStyle::Lf),
            other => Err(format!("unknown newline style '{}' (none, crlf, lf)", other)),
        }
    }
}

impl fmt::Display for NewLineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewLineStyle::None => f.write_str("none"),
            NewLineStyle::Crlf => f.write_str("crlf"),
            NewLineStyle::Lf => f.write_str("lf"),
        }
    }
}

/// Where the note template comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSource {
    /// One of the two built-in templates, picked by `tags_as_links`
    #[default]
    Builtin,
    /// A markdown file inside the vault (`custom_template_path`)
    Custom,
}

impl FromStr for TemplateSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "builtin" => Ok(TemplateSource::Builtin),
            "custom" => Ok(TemplateSource::Custom),
            other => Err(format!("unknown template source '{}' (builtin, custom)", other)),
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Builtin => f.write_str("builtin"),
            TemplateSource::Custom => f.write_str("custom"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for application data (the file-backed buffer lives here)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of the note vault
    #[serde(default = "default_vault_dir")]
    pub vault_dir: PathBuf,

    /// Whose buffer to consume
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Vault folder new notes are created in
    #[serde(default = "default_folder_path")]
    pub folder_path: String,

    #[serde(default)]
    pub update_mode: UpdateMode,

    #[serde(default)]
    pub new_line_style: NewLineStyle,

    /// Render tags as `[[links]]` (true) or plain values (false)
    #[serde(default = "default_true")]
    pub tags_as_links: bool,

    /// Frontmatter property that holds tag links
    #[serde(default = "default_link_property")]
    pub link_property: String,

    #[serde(default)]
    pub template_source: TemplateSource,

    /// Vault-relative path of the custom template
    #[serde(default)]
    pub custom_template_path: Option<PathBuf>,

    /// strftime format for `{date_formatted}` (matches daily note names)
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// How often the file buffer is checked for changes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Log file path (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vault_dir: default_vault_dir(),
            user_id: default_user_id(),
            folder_path: default_folder_path(),
            update_mode: UpdateMode::default(),
            new_line_style: NewLineStyle::default(),
            tags_as_links: true,
            link_property: default_link_property(),
            template_source: TemplateSource::default(),
            custom_template_path: None,
            date_format: default_date_format(),
            poll_interval_ms: default_poll_interval_ms(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (PENRELAY_DATA_DIR, PENRELAY_VAULT_DIR, ...)
    /// 2. Config file (~/.config/penrelay/config.toml or PENRELAY_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_VAULT_DIR", ENV_PREFIX)) {
            self.vault_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_USER_ID", ENV_PREFIX)) {
            if !val.is_empty() {
                self.user_id = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_UPDATE_MODE", ENV_PREFIX)) {
            self.update_mode = UpdateMode::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_FOLDER_PATH", ENV_PREFIX)) {
            self.folder_path = val;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with PENRELAY_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("penrelay")
            .join("config.toml")
    }

    /// Directory holding the file-backed remote buffer
    pub fn buffer_dir(&self) -> PathBuf {
        self.data_dir.join("buffer")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("penrelay")
}

fn default_vault_dir() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Vault")
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_folder_path() -> String {
    "AudioPen".to_string()
}

fn default_link_property() -> String {
    "x".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d-%A".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}
