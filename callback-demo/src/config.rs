//! Configuration loading and parsing

use anyhow::{Context, Result};
use async_callback::TransportConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub demo: DemoSettings,
}

/// Values published by the demo run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoSettings {
    /// Integer published on the test interface
    #[serde(default = "default_value")]
    pub value: i32,
    /// Text published on the string interface
    #[serde(default = "default_message")]
    pub message: String,
    /// Id carried as user data by the second test subscriber
    #[serde(default = "default_user_id")]
    pub user_id: i32,
    /// Values published by `--stress` when no count is given on the command line
    #[serde(default = "default_stress_iterations")]
    pub stress_iterations: u64,
}

fn default_value() -> i32 {
    123
}

fn default_message() -> String {
    "Hello World!".to_string()
}

fn default_user_id() -> i32 {
    555
}

fn default_stress_iterations() -> u64 {
    1000
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            value: default_value(),
            message: default_message(),
            user_id: default_user_id(),
            stress_iterations: default_stress_iterations(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<DemoConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: DemoConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .transport
        .allocator_config()
        .validate()
        .with_context(|| format!("Invalid [transport] section in {:?}", path))?;

    Ok(config)
}
