// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "gelf-amqp.json";

/// Construction parameters of a `GelfAmqpSender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// AMQP URI, including credentials and `amqps` scheme for TLS.
    pub uri: String,
    pub exchange_name: String,
    /// Falls back to `exchange_name` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub routing_key: String,
    /// Retries after the first attempt. Negative means retry forever.
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

// Default values
pub fn default_max_retries() -> i32 {
    3
}

impl SenderConfig {
    pub fn new(uri: &str, exchange_name: &str, routing_key: &str, max_retries: i32) -> Self {
        SenderConfig {
            uri: uri.to_string(),
            exchange_name: exchange_name.to_string(),
            queue_name: None,
            routing_key: routing_key.to_string(),
            max_retries,
        }
    }

    pub fn with_queue_name(mut self, queue_name: &str) -> Self {
        self.queue_name = Some(queue_name.to_string());
        self
    }

    pub fn queue_name(&self) -> &str {
        self.queue_name.as_deref().unwrap_or(&self.exchange_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(anyhow!("Configuration error: uri cannot be empty"));
        }
        if self.exchange_name.is_empty() {
            return Err(anyhow!("Configuration error: exchange_name cannot be empty"));
        }
        if self.queue_name.as_deref() == Some("") {
            return Err(anyhow!("Configuration error: queue_name cannot be empty when set"));
        }
        Ok(())
    }
}

pub fn find_config_file() -> Result<PathBuf> {
    let config_dir_path = Path::new("config").join(CONFIG_FILE_NAME);
    let locations = [
        ("Current directory", Path::new(CONFIG_FILE_NAME)),
        ("Current directory (alternative)", config_dir_path.as_path()),
    ];

    for (location_name, path) in locations.iter() {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Ok(path.to_path_buf());
        }
    }

    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{CONFIG_FILE_NAME}"));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Ok(home_config);
        }
    }

    Err(anyhow!(
        "Could not find {CONFIG_FILE_NAME} in the current directory, config/ or your home directory"
    ))
}

pub fn load_config() -> Result<SenderConfig> {
    let config_path = find_config_file()?;
    load_config_from(&config_path)
}

pub fn load_config_from(path: &Path) -> Result<SenderConfig> {
    let config_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: SenderConfig = serde_json::from_str(&config_content)
        .context("Configuration file contains invalid JSON or missing required fields")?;

    config.validate()?;
    Ok(config)
}
