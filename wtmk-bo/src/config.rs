//! Configuration resolution for wtmk-bo
//!
//! Priority: environment variables → TOML config file → compiled defaults.
//! The poll interval is clamped to a non-zero lower bound so a
//! misconfigured cadence can never flood the Batch Store.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use wtmk_common::{Error, Result};

use crate::services::MonitorConfig;

/// Minimum accepted poll cadence
const MIN_POLL_INTERVAL_MS: u64 = 100;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5733";
const DEFAULT_STORE_URL: &str = "http://127.0.0.1:5734";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_TICK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_DEGRADED_THRESHOLD: u32 = 3;

/// TOML file shape (all fields optional; absent keys fall through)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub store_url: Option<String>,
    pub bind_address: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub tick_timeout_ms: Option<u64>,
    pub degraded_threshold: Option<u32>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct BoConfig {
    /// Base URL of the Batch Store / transformation backend
    pub store_url: String,
    /// Listen address for the HTTP API
    pub bind_address: String,
    /// Monitor poll cadence
    pub poll_interval: Duration,
    /// Per-tick fetch deadline
    pub tick_timeout: Duration,
    /// Consecutive failed ticks before escalation
    pub degraded_threshold: u32,
}

impl Default for BoConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            tick_timeout: Duration::from_millis(DEFAULT_TICK_TIMEOUT_MS),
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
        }
    }
}

impl BoConfig {
    /// Resolve configuration from ENV → TOML → defaults
    pub fn load() -> Result<Self> {
        let toml_config = match config_file_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
                let parsed: TomlConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?;
                info!("Loaded TOML config from {}", path.display());
                parsed
            }
            _ => TomlConfig::default(),
        };

        Ok(Self::resolve(toml_config))
    }

    /// Merge one TOML layer under the environment layer
    pub fn resolve(toml_config: TomlConfig) -> Self {
        let defaults = Self::default();

        let store_url = env_string("WTMK_STORE_URL")
            .or(toml_config.store_url)
            .unwrap_or(defaults.store_url);
        let bind_address = env_string("WTMK_BIND_ADDRESS")
            .or(toml_config.bind_address)
            .unwrap_or(defaults.bind_address);

        let mut poll_interval_ms = env_u64("WTMK_POLL_INTERVAL_MS")
            .or(toml_config.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms < MIN_POLL_INTERVAL_MS {
            warn!(
                configured = poll_interval_ms,
                clamped = MIN_POLL_INTERVAL_MS,
                "Poll interval below minimum, clamping"
            );
            poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }

        let tick_timeout_ms = env_u64("WTMK_TICK_TIMEOUT_MS")
            .or(toml_config.tick_timeout_ms)
            .unwrap_or(DEFAULT_TICK_TIMEOUT_MS);
        let degraded_threshold = env_u32("WTMK_DEGRADED_THRESHOLD")
            .or(toml_config.degraded_threshold)
            .unwrap_or(DEFAULT_DEGRADED_THRESHOLD)
            .max(1);

        Self {
            store_url,
            bind_address,
            poll_interval: Duration::from_millis(poll_interval_ms),
            tick_timeout: Duration::from_millis(tick_timeout_ms),
            degraded_threshold,
        }
    }

    /// Monitor policy knobs for new sessions
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: self.poll_interval,
            tick_timeout: self.tick_timeout,
            degraded_threshold: self.degraded_threshold,
        }
    }
}

/// Config file location: explicit override via WTMK_BO_CONFIG, else the
/// user config directory.
fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("WTMK_BO_CONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config").join("wtmk").join("wtmk-bo.toml"))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
