//! Price → on/off decision.
//!
//! Pure mapping of (price, thresholds, previous intent) to a desired state.
//! No I/O and no hidden state, so every branch is tested directly below.

use tracing::debug;

use crate::types::{Celsius, DecisionReason, DesiredState, DeviceState, Price, ThresholdConfig};

pub struct DecisionEngine {
    /// Setpoint applied when the engine turns the heat pump on.
    default_setpoint: Celsius,
}

impl DecisionEngine {
    pub fn new(default_setpoint: Celsius) -> Self {
        Self { default_setpoint }
    }

    pub fn default_setpoint(&self) -> Celsius {
        self.default_setpoint
    }

    /// Decide the desired device state for `price`.
    ///
    /// Single mode is inclusive at the threshold. Hysteresis mode is strict
    /// at both ends, so `start` and `stop` belong to the dead zone, where
    /// the previous state is held (off when nothing was commanded yet).
    pub fn decide(
        &self,
        price: &Price,
        config: ThresholdConfig,
        previous: Option<DeviceState>,
    ) -> DesiredState {
        let value = price.value;

        let (on, reason) = match config {
            ThresholdConfig::Single { threshold } => {
                if value <= threshold {
                    (true, DecisionReason::AtOrBelowThreshold)
                } else {
                    (false, DecisionReason::AboveThreshold)
                }
            }
            ThresholdConfig::Hysteresis { start, stop } => {
                if value < start {
                    (true, DecisionReason::BelowStart)
                } else if value > stop {
                    (false, DecisionReason::AboveStop)
                } else {
                    match previous {
                        Some(prev) => (prev.on, DecisionReason::DeadZoneHold),
                        None => (false, DecisionReason::DeadZoneDefaultOff),
                    }
                }
            }
        };

        let setpoint = if on && !reason.is_hold() {
            Some(self.default_setpoint)
        } else {
            None
        };

        debug!(price = %value, thresholds = %config, ?previous, on, ?reason, "Decision");

        DesiredState {
            on,
            setpoint,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
