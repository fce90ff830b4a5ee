use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use crate::counter::CounterMode;
use crate::queue::OrientationSelector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Device identity, assigned during registration.  `tv_id <= 0` means the
/// device is unregistered and presence reporting stays off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub tv_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_orientation")]
    pub orientation: OrientationSelector,
    /// When enabled and `filter_code` is positive, the catalog fetch is
    /// constrained to that code.
    #[serde(default)]
    pub filter_enabled: bool,
    #[serde(default)]
    pub filter_code: u32,
    /// Re-fetch interval while nothing is playing (seconds).
    #[serde(default = "default_refetch_secs")]
    pub refetch_secs: u64,
}

impl PlaybackConfig {
    /// The effective filter code for a catalog fetch, if any.
    pub fn effective_filter(&self) -> Option<u32> {
        if self.filter_enabled && self.filter_code > 0 {
            Some(self.filter_code)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_counter_mode")]
    pub counter: CounterMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { tv_id: 0 }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            orientation: default_orientation(),
            filter_enabled: false,
            filter_code: 0,
            refetch_secs: default_refetch_secs(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            counter: default_counter_mode(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_orientation() -> OrientationSelector {
    OrientationSelector::Landscape
}

fn default_refetch_secs() -> u64 {
    300
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_counter_mode() -> CounterMode {
    CounterMode::Atomic
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            playback: PlaybackConfig::default(),
            backend: BackendConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
