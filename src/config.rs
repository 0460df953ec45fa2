//! Bridge configuration
//!
//! Endpoint addresses are fixed at startup: environment variables override
//! the built-in defaults, and a JSON config file (created on first run)
//! overrides both. Nothing is reloadable at runtime.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error;

// Default configuration values
const DEFAULT_DEVICE_HOST: &str = "0.0.0.0";
const DEFAULT_DEVICE_PORT: u16 = 9000;
const DEFAULT_DASHBOARD_HOST: &str = "0.0.0.0";
const DEFAULT_DASHBOARD_PORT: u16 = 5000;

/// Main configuration struct for the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device-facing WebSocket endpoint
    #[serde(default)]
    pub device: DeviceConfig,
    /// Dashboard-facing HTTP/WebSocket endpoint
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Device endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host to bind the device listener to
    #[serde(default = "default_device_host")]
    pub host: String,
    /// Port to bind the device listener to
    #[serde(default = "default_device_port")]
    pub port: u16,
}

/// Dashboard endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Host to bind the dashboard listener to
    #[serde(default = "default_dashboard_host")]
    pub host: String,
    /// Port to bind the dashboard listener to
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl DeviceConfig {
    /// Socket address string for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DashboardConfig {
    /// Socket address string for binding
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Default functions
fn default_device_host() -> String {
    std::env::var("BRIDGE_DEVICE_HOST").unwrap_or_else(|_| DEFAULT_DEVICE_HOST.to_string())
}

fn default_device_port() -> u16 {
    std::env::var("BRIDGE_DEVICE_PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_DEVICE_PORT)
}

fn default_dashboard_host() -> String {
    std::env::var("BRIDGE_DASHBOARD_HOST").unwrap_or_else(|_| DEFAULT_DASHBOARD_HOST.to_string())
}

fn default_dashboard_port() -> u16 {
    std::env::var("BRIDGE_DASHBOARD_PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_DASHBOARD_PORT)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_device_host(),
            port: default_device_port(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_dashboard_host(),
            port: default_dashboard_port(),
        }
    }
}

/// Load the bridge configuration
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path();
    load_or_create_config(&config_path).await
}

/// Get the path to the configuration file
fn get_config_path() -> PathBuf {
    match std::env::var("BRIDGE_CONFIG_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from("bridge.json"),
    }
}

/// Load configuration from file or create default
async fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let default_config = Config::default();
        save_config(path, &default_config).await?;
        info!("Created default configuration at {}", path.display());
        return Ok(default_config);
    }

    let config_str = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&config_str).map_err(error::config_invalid)?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Save configuration to file
async fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}
