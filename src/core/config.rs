// src/core/config.rs

use crate::constants::{DEFAULT_WEBHOOK_HOST, DEFAULT_WEBHOOK_PORT};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application settings, supplied once at startup.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub name: String,
    pub description: String,
    /// Shown by `--version`. Defaults to no version flag.
    pub version: Option<String>,
    /// Lets the CLI adapter ignore flags it does not know about instead of failing.
    pub allow_unknown_options: bool,
    pub webhook_host: String,
    pub webhook_port: u16,
    /// Upper bound on re-prompts for a parameter that keeps failing validation.
    /// `None` keeps asking for as long as the user keeps answering.
    pub max_validation_attempts: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            description: String::new(),
            version: None,
            allow_unknown_options: false,
            webhook_host: DEFAULT_WEBHOOK_HOST.to_string(),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            max_validation_attempts: None,
        }
    }
}

impl AppConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading config from '{}'", path.display());
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }
}
