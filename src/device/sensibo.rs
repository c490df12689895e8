//! Sensibo smart AC controller integration.
//!
//! API docs: https://sensibo.github.io/
//! Base URL: https://home.sensibo.com/api/v2
//! Auth: `apiKey` query parameter.
//!
//! Turning on sets `mode = heat` at the requested setpoint; turning off
//! parks the unit in `fan` mode at the minimum temperature.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{DeviceActuator, DeviceStatus, RetryPolicy};
use crate::config::{AppConfig, DeviceConfig};
use crate::types::{ActuationError, Celsius};

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AcStateRequest {
    #[serde(rename = "acState")]
    ac_state: AcStateCommand,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcStateCommand {
    on: bool,
    target_temperature: Celsius,
    mode: &'static str,
    fan_level: &'static str,
    swing: &'static str,
}

/// `GET /pods/{id}?fields=acState,measurements` response.
#[derive(Debug, Deserialize)]
struct PodResponse {
    #[serde(default)]
    result: Option<PodResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodResult {
    #[serde(default)]
    ac_state: Option<ReportedAcState>,
    #[serde(default)]
    measurements: Option<Measurements>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportedAcState {
    #[serde(default)]
    on: Option<bool>,
    #[serde(default)]
    target_temperature: Option<Celsius>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Measurements {
    #[serde(default)]
    temperature: Option<f64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SensiboClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    device_id: Option<String>,
    min_temp: Celsius,
    default_temp: Celsius,
    retry: RetryPolicy,
    status_timeout: Duration,
    verify_before_actuation: bool,
}

impl SensiboClient {
    /// Create a client. Missing credentials are allowed here and reported
    /// as `NotConfigured` on use.
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        device_id: Option<String>,
        min_temp: Celsius,
        default_temp: Celsius,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SPOTHEAT/0.1.0")
            .build()
            .context("Failed to build HTTP client for Sensibo")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            device_id,
            min_temp,
            default_temp,
            retry: RetryPolicy::default(),
            status_timeout: Duration::from_secs(5),
            verify_before_actuation: false,
        })
    }

    pub fn from_config(cfg: &DeviceConfig) -> Result<Self> {
        let api_key = AppConfig::resolve_env(&cfg.api_key_env).ok().map(SecretString::new);
        let device_id = AppConfig::resolve_env(&cfg.device_id_env).ok();
        if api_key.is_none() || device_id.is_none() {
            warn!(
                api_key_env = %cfg.api_key_env,
                device_id_env = %cfg.device_id_env,
                "Missing Sensibo API credentials, device commands will fail"
            );
        }

        let client = Self::new(
            &cfg.base_url,
            api_key,
            device_id,
            cfg.min_temp,
            cfg.default_temp,
            cfg.timeout(),
        )?
        .with_retry(RetryPolicy::from(&cfg.retry))
        .with_status_check(cfg.verify_before_actuation, cfg.status_timeout());
        Ok(client)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Probe the device before each command, bounded by `timeout`.
    pub fn with_status_check(mut self, enabled: bool, timeout: Duration) -> Self {
        self.verify_before_actuation = enabled;
        self.status_timeout = timeout;
        self
    }

    fn credentials(&self) -> Result<(&SecretString, &str), ActuationError> {
        match (&self.api_key, &self.device_id) {
            (Some(key), Some(id)) => Ok((key, id.as_str())),
            _ => Err(ActuationError::NotConfigured(
                "missing Sensibo API key or device id".into(),
            )),
        }
    }

    fn pod_url(&self, device_id: &str) -> String {
        format!("{}/pods/{}", self.base_url, urlencoding::encode(device_id))
    }

    /// Build the command, refusing setpoints below the safe minimum.
    fn command(&self, on: bool, setpoint: Option<Celsius>) -> Result<AcStateCommand, ActuationError> {
        let target = if on {
            let requested = setpoint.unwrap_or(self.default_temp);
            if requested < self.min_temp {
                return Err(ActuationError::Unsafe {
                    requested,
                    minimum: self.min_temp,
                });
            }
            requested
        } else {
            self.min_temp
        };

        Ok(AcStateCommand {
            on,
            target_temperature: target,
            mode: if on { "heat" } else { "fan" },
            fan_level: "auto",
            swing: "stopped",
        })
    }

    /// Advisory reachability check. Never fails the caller.
    async fn probe(&self) {
        match self.status().await {
            Ok(status) => debug!(?status, "Device reachable"),
            Err(e) => warn!(error = %e, "Device status check failed, sending command anyway"),
        }
    }
}

#[async_trait]
impl DeviceActuator for SensiboClient {
    async fn set_state(&self, on: bool, setpoint: Option<Celsius>) -> Result<(), ActuationError> {
        let command = self.command(on, setpoint).map_err(|e| {
            warn!(on, ?setpoint, error = %e, "Refusing device command");
            e
        })?;
        let (api_key, device_id) = self.credentials().map_err(|e| {
            error!(error = %e, "Cannot command heat pump");
            e
        })?;

        if self.verify_before_actuation {
            self.probe().await;
        }

        let url = format!("{}/acStates", self.pod_url(device_id));
        let request = AcStateRequest { ac_state: command };
        let mut last_error = String::new();

        for attempt in 0..self.retry.max_attempts() {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying Sensibo command");
                tokio::time::sleep(delay).await;
            }

            debug!(url = %url, on, target = request.ac_state.target_temperature, "Sending Sensibo command");

            let resp = self
                .http
                .post(&url)
                .query(&[("apiKey", api_key.expose_secret().as_str())])
                .header("Accept", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        info!(
                            on,
                            target = request.ac_state.target_temperature,
                            mode = request.ac_state.mode,
                            "Heat pump turned {}",
                            if on { "on" } else { "off" }
                        );
                        return Ok(());
                    }

                    let body = response.text().await.unwrap_or_default();
                    error!(status = %status, body = %body, on, "Sensibo rejected command");
                    return Err(ActuationError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(attempt, error = %e, "Sensibo request failed");
                    last_error = e.to_string();
                }
                Err(e) => {
                    error!(error = %e, "Sensibo request could not be sent");
                    return Err(ActuationError::Transport {
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
            }
        }

        error!(
            attempts = self.retry.max_attempts(),
            error = %last_error,
            on,
            "Giving up on Sensibo command"
        );
        Err(ActuationError::Transport {
            attempts: self.retry.max_attempts(),
            message: last_error,
        })
    }

    async fn status(&self) -> Result<DeviceStatus, ActuationError> {
        let (api_key, device_id) = self.credentials()?;
        let url = self.pod_url(device_id);

        let response = self
            .http
            .get(&url)
            .timeout(self.status_timeout)
            .query(&[
                ("apiKey", api_key.expose_secret().as_str()),
                ("fields", "acState,measurements"),
            ])
            .send()
            .await
            .map_err(|e| ActuationError::Transport {
                attempts: 1,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActuationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let pod: PodResponse = response.json().await.map_err(|e| ActuationError::Rejected {
            status: status.as_u16(),
            body: format!("unparseable status body: {e}"),
        })?;

        let result = pod.result.unwrap_or(PodResult {
            ac_state: None,
            measurements: None,
        });
        let ac = result.ac_state;

        Ok(DeviceStatus {
            on: ac.as_ref().and_then(|a| a.on),
            target_temperature: ac.as_ref().and_then(|a| a.target_temperature),
            mode: ac.and_then(|a| a.mode),
            room_temperature: result.measurements.and_then(|m| m.temperature),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
