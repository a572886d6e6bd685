//! Configuration types for the camera viewer

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::endpoints::normalize_base;

/// Base address baked in at build time through `CAMVIEW_API_BASE`
pub const BUILD_DEFAULT_BASE: Option<&str> = option_env!("CAMVIEW_API_BASE");

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base address of the camera device; empty means same origin
    #[serde(default = "default_base")]
    pub base: String,
    /// Where requests from this process go while `base` is empty. The viewer
    /// page proxies the device endpoints to this origin.
    #[serde(default = "default_device_origin")]
    pub device_origin: String,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: default_base(),
            device_origin: default_device_origin(),
            liveness: LivenessConfig::default(),
            stream: StreamConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Health probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_poll_interval_ms(),
        }
    }
}

impl LivenessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Native stream attachment configuration. Off by default: the device may
/// serve a single stream client, which belongs to the viewer page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl StreamConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Viewer page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
        }
    }
}

fn default_base() -> String {
    BUILD_DEFAULT_BASE.unwrap_or_default().to_string()
}

fn default_device_origin() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    crate::liveness::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

impl Config {
    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.liveness.poll_interval_ms == 0 {
            return Err(crate::CamviewError::Config(
                "liveness.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if normalize_base(&self.device_origin).is_empty() {
            return Err(crate::CamviewError::Config(
                "device_origin must not be empty".to_string(),
            ));
        }
        if self.liveness.probe_timeout_ms == 0 {
            return Err(crate::CamviewError::Config(
                "liveness.probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::CamviewError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
