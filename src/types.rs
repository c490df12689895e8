//! Shared types for the SPOTHEAT controller.
//!
//! These types form the data model used across all modules: the price
//! reading, the threshold configuration, the commanded device state and
//! the domain error taxonomy. Price and engine modules depend on them
//! without depending on each other.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Temperature setpoint in whole degrees Celsius (the device API only
/// accepts integers).
pub type Celsius = i32;

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// Spot price for one hour, in display units (öre/kWh by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub value: Decimal,
    /// Local hour of day (0–23) in the feed's timezone.
    pub hour: u32,
    /// Local calendar date the price was quoted for.
    pub date: NaiveDate,
    /// Bidding zone code, e.g. "SE3".
    pub area: String,
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} öre/kWh ({} {:02}:00, {})",
            self.value, self.date, self.hour, self.area
        )
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Decision boundary used to interpret a price.
///
/// Serialized as a single document keyed by `mode`:
/// `{"mode":"single","threshold":5.0}` or
/// `{"mode":"hysteresis","start":5.0,"stop":10.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdConfig {
    /// price <= threshold ⇒ on, else off.
    Single { threshold: Decimal },
    /// price < start ⇒ on, price > stop ⇒ off, otherwise hold.
    Hysteresis { start: Decimal, stop: Decimal },
}

/// Threshold used when nothing has been configured yet (öre/kWh).
pub const DEFAULT_THRESHOLD: Decimal = dec!(5.00);

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig::Single {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ThresholdConfig {
    /// Check the invariants every persisted configuration must satisfy.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        match *self {
            ThresholdConfig::Single { threshold } => {
                if threshold <= Decimal::ZERO {
                    return Err(ThresholdError::Invalid(format!(
                        "threshold must be positive, got {threshold}"
                    )));
                }
            }
            ThresholdConfig::Hysteresis { start, stop } => {
                if start <= Decimal::ZERO || stop <= Decimal::ZERO {
                    return Err(ThresholdError::Invalid(format!(
                        "start and stop must be positive, got start={start} stop={stop}"
                    )));
                }
                if start >= stop {
                    return Err(ThresholdError::Invalid(format!(
                        "start must be below stop, got start={start} stop={stop}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> &'static str {
        match self {
            ThresholdConfig::Single { .. } => "single",
            ThresholdConfig::Hysteresis { .. } => "hysteresis",
        }
    }
}

impl fmt::Display for ThresholdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdConfig::Single { threshold } => write!(f, "single(<= {threshold})"),
            ThresholdConfig::Hysteresis { start, stop } => {
                write!(f, "hysteresis(on < {start}, off > {stop})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// Last commanded power state of the heat pump.
///
/// The remote device stays the source of truth; this is only our intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub on: bool,
    pub setpoint: Option<Celsius>,
}

impl DeviceState {
    pub fn on(setpoint: Option<Celsius>) -> Self {
        Self { on: true, setpoint }
    }

    pub fn off() -> Self {
        Self {
            on: false,
            setpoint: None,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.on, self.setpoint) {
            (true, Some(t)) => write!(f, "ON @ {t}°C"),
            (true, None) => write!(f, "ON"),
            (false, _) => write!(f, "OFF"),
        }
    }
}

/// Why the decision engine picked a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AtOrBelowThreshold,
    AboveThreshold,
    BelowStart,
    AboveStop,
    /// Inside the dead zone, keeping the previous state.
    DeadZoneHold,
    /// Inside the dead zone with no known previous state.
    DeadZoneDefaultOff,
}

impl DecisionReason {
    /// Whether the decision keeps whatever the device is doing.
    pub fn is_hold(&self) -> bool {
        matches!(self, DecisionReason::DeadZoneHold)
    }
}

/// Output of the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub on: bool,
    /// Only set when actively turning on.
    pub setpoint: Option<Celsius>,
    pub reason: DecisionReason,
}

impl DesiredState {
    pub fn as_device_state(&self) -> DeviceState {
        DeviceState {
            on: self.on,
            setpoint: self.setpoint,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// The price for the requested hour could not be obtained. Recoverable:
/// the cycle is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Price unavailable for {date} hour {hour}: {reason}")]
pub struct PriceUnavailable {
    pub date: NaiveDate,
    pub hour: u32,
    pub reason: PriceUnavailableReason,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceUnavailableReason {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no entry for the hour ({entries} entries published)")]
    MissingHour { entries: usize },

    #[error("hour out of range")]
    InvalidHour,
}

/// A threshold update was not applied. The previous configuration stays.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    #[error("Invalid threshold: {0}")]
    Invalid(String),

    #[error("Threshold storage error: {0}")]
    Storage(String),
}

/// Failure to realise a device state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuationError {
    /// Network-level failure, after all retries were spent.
    #[error("Device transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    /// Device API answered with a non-2xx status.
    #[error("Device API rejected command (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Setpoint below the configured minimum; nothing was sent.
    #[error("Unsafe setpoint {requested}°C, minimum is {minimum}°C")]
    Unsafe { requested: Celsius, minimum: Celsius },

    #[error("Device not configured: {0}")]
    NotConfigured(String),
}

/// Errors surfaced through the control service to the web layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("Another control cycle is in progress")]
    Busy,

    #[error(transparent)]
    PriceUnavailable(#[from] PriceUnavailable),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Actuation(#[from] ActuationError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        assert_eq!(
            ThresholdConfig::default(),
            ThresholdConfig::Single { threshold: dec!(5) }
        );
    }

    #[test]
    fn test_validate_single() {
        assert!(ThresholdConfig::Single { threshold: dec!(0.01) }.validate().is_ok());
        assert!(ThresholdConfig::Single { threshold: dec!(0) }.validate().is_err());
        assert!(ThresholdConfig::Single { threshold: dec!(-3) }.validate().is_err());
    }

    #[test]
    fn test_validate_hysteresis() {
        let ok = ThresholdConfig::Hysteresis { start: dec!(5), stop: dec!(10) };
        assert!(ok.validate().is_ok());

        let equal = ThresholdConfig::Hysteresis { start: dec!(7), stop: dec!(7) };
        assert!(matches!(equal.validate(), Err(ThresholdError::Invalid(_))));

        let inverted = ThresholdConfig::Hysteresis { start: dec!(10), stop: dec!(5) };
        assert!(inverted.validate().is_err());

        let negative = ThresholdConfig::Hysteresis { start: dec!(-1), stop: dec!(5) };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_threshold_serialization_layout() {
        let single = ThresholdConfig::Single { threshold: dec!(5.5) };
        let json: serde_json::Value = serde_json::to_value(single).unwrap();
        assert_eq!(json["mode"], "single");
        assert_eq!(json["threshold"].as_f64(), Some(5.5));

        let hyst: ThresholdConfig =
            serde_json::from_str(r#"{"mode":"hysteresis","start":5,"stop":10.25}"#).unwrap();
        assert_eq!(hyst, ThresholdConfig::Hysteresis { start: dec!(5), stop: dec!(10.25) });
    }

    #[test]
    fn test_device_state_display() {
        assert_eq!(DeviceState::on(Some(22)).to_string(), "ON @ 22°C");
        assert_eq!(DeviceState::off().to_string(), "OFF");
    }

    #[test]
    fn test_error_messages() {
        let err = ActuationError::Unsafe { requested: 8, minimum: 10 };
        assert_eq!(err.to_string(), "Unsafe setpoint 8°C, minimum is 10°C");

        let err = PriceUnavailable {
            date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            hour: 21,
            reason: PriceUnavailableReason::MissingHour { entries: 20 },
        };
        assert!(err.to_string().contains("20 entries"));
    }
}
