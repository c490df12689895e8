//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the Sensibo API key and device id) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.
//! A handful of plain env vars (`PRIS_KLASSE`, `MIN_TEMP`, `DEFAULT_TEMP`)
//! override the file, matching how the controller has been deployed.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::Celsius;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub price: PriceConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    /// Skip the device call when the decision equals the last commanded state.
    #[serde(default)]
    pub skip_unchanged: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceConfig {
    pub base_url: String,
    /// Bidding zone, e.g. "SE3".
    pub area: String,
    /// IANA name of the feed's reference timezone.
    pub timezone: String,
    pub timeout_secs: u64,
    /// Multiplier from feed unit to display unit (SEK → öre = 100).
    #[serde(default = "default_unit_multiplier")]
    pub unit_multiplier: u32,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub device_id_env: String,
    pub min_temp: Celsius,
    pub default_temp: Celsius,
    pub timeout_secs: u64,
    pub status_timeout_secs: u64,
    #[serde(default)]
    pub verify_before_actuation: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdsConfig {
    pub path: String,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            path: crate::storage::DEFAULT_THRESHOLD_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_unit_multiplier() -> u32 {
    100
}

fn default_decimals() -> u32 {
    2
}

impl AppConfig {
    /// Load configuration from a TOML file, apply env overrides and validate.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Override selected fields from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(area) = std::env::var("PRIS_KLASSE") {
            self.price.area = area;
        }
        if let Ok(v) = std::env::var("MIN_TEMP") {
            self.device.min_temp = v
                .parse()
                .with_context(|| format!("MIN_TEMP is not an integer: {v}"))?;
        }
        if let Ok(v) = std::env::var("DEFAULT_TEMP") {
            self.device.default_temp = v
                .parse()
                .with_context(|| format!("DEFAULT_TEMP is not an integer: {v}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller.cycle_interval_secs == 0 {
            anyhow::bail!("controller.cycle_interval_secs must be greater than zero");
        }
        if self.price.area.trim().is_empty() {
            anyhow::bail!("price.area must not be empty");
        }
        self.price.tz()?;
        if self.device.default_temp < self.device.min_temp {
            anyhow::bail!(
                "device.default_temp ({}) is below device.min_temp ({})",
                self.device.default_temp,
                self.device.min_temp
            );
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl PriceConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone {}: {e}", self.timezone))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }
}
