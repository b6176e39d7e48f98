use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tuition.toml";

/// Runtime configuration, read from a TOML file and overridden by CLI flags.
///
/// ```toml
/// database = "academy.db"
/// max_retries = 5
/// busy_timeout_ms = 2000
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite database file
    pub database: String,
    /// How many times an event is re-applied after a concurrent update
    pub max_retries: u32,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
    /// Default tracing filter, e.g. "info" or "tuition=debug"
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "tuition.db".to_string(),
            max_retries: 3,
            busy_timeout_ms: 5000,
            log_level: None,
        }
    }
}

impl Config {
    pub fn from_toml(input: &str) -> Result<Self> {
        toml::from_str(input).context("Invalid configuration")
    }

    /// Load configuration from `path`, or from `tuition.toml` when it exists.
    /// Missing default file means built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(Some(default))
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
