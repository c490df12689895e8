//! Heat pump actuation.
//!
//! Defines the `DeviceActuator` trait, the explicit retry policy used by
//! network-backed actuators, and the Sensibo implementation.

pub mod sensibo;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::config::RetryConfig;
use crate::types::{ActuationError, Celsius};

/// Abstraction over the remote device-control API.
///
/// `set_state` is the only irreversible external action in the system.
/// Implementations must make repeated identical calls harmless.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceActuator: Send + Sync {
    /// Command the device on (with an optional setpoint) or off.
    async fn set_state(&self, on: bool, setpoint: Option<Celsius>) -> Result<(), ActuationError>;

    /// Query the device's reported state.
    async fn status(&self) -> Result<DeviceStatus, ActuationError>;
}

/// State as reported by the device itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub on: Option<bool>,
    pub target_temperature: Option<Celsius>,
    pub mode: Option<String>,
    pub room_temperature: Option<f64>,
}

/// Bounded retry for transient transport failures.
///
/// Only connection errors and timeouts qualify; an application-level
/// rejection is final. Backoff doubles per retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_backoff: Duration::from_millis(cfg.base_backoff_ms),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt - 1))
    }
}
