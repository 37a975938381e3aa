//! Configuration management for Nakama
//!
//! Handles loading and parsing of the YAML configuration file. Every field
//! has a default, so a missing file or a partial one is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::device::DEVICE_NAME;
use crate::resolver::DEFAULT_RESOLVE_TIMEOUT;
use crate::transport::{SessionOptions, TransportKind};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    /// How often a RUNNING session is checked for an unexpected end
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
}

/// Local virtual MIDI device
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_name")]
    pub name: String,
}

/// Host name resolution
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolve_timeout_ms")]
    pub timeout_ms: u64,
}

/// Native session
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(flatten)]
    pub session: SessionOptions,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration, using defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver.timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            resolver: ResolverConfig::default(),
            transport: TransportConfig::default(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_resolve_timeout_ms(),
        }
    }
}

// Default value functions
fn default_device_name() -> String { DEVICE_NAME.to_string() }
fn default_resolve_timeout_ms() -> u64 { DEFAULT_RESOLVE_TIMEOUT.as_millis() as u64 }
fn default_watchdog_interval_ms() -> u64 { 1000 }
