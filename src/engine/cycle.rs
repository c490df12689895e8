//! Control cycle: fetch price → decide → actuate.
//!
//! One cycle runs at a time. A cycle (or manual override) that finds the
//! gate taken is skipped, not queued, so two commands never interleave on
//! the device.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::decision::DecisionEngine;
use crate::device::DeviceActuator;
use crate::price::{local_slot, PriceSource};
use crate::storage::ThresholdStore;
use crate::types::{
    ActuationError, ControlError, DesiredState, DeviceState, Price, PriceUnavailable,
    ThresholdConfig,
};

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    FetchingPrice,
    Deciding,
    Actuating,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle held the gate.
    Skipped,
    /// No price for the current hour; nothing was sent.
    PriceUnavailable(PriceUnavailable),
    /// The decision needed no command.
    Unchanged,
    Actuated(DeviceState),
    ActuationFailed(ActuationError),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::PriceUnavailable(_) => "price_unavailable",
            CycleOutcome::Unchanged => "unchanged",
            CycleOutcome::Actuated(_) => "actuated",
            CycleOutcome::ActuationFailed(_) => "actuation_failed",
        }
    }

    pub fn error(&self) -> Option<String> {
        match self {
            CycleOutcome::PriceUnavailable(e) => Some(e.to_string()),
            CycleOutcome::ActuationFailed(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

/// Summary of a single control cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub price: Option<Price>,
    pub thresholds: Option<ThresholdConfig>,
    pub decision: Option<DesiredState>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    fn new(cycle_number: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            cycle_number,
            started_at,
            price: None,
            thresholds: None,
            decision: None,
            outcome: CycleOutcome::Skipped,
        }
    }
}

/// Resets the published phase to `Idle` however the cycle ends.
struct PhaseGuard<'a>(&'a watch::Sender<CyclePhase>);

impl PhaseGuard<'_> {
    fn enter(&self, phase: CyclePhase) {
        self.0.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(CyclePhase::Idle);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ControlCycle {
    prices: Arc<dyn PriceSource>,
    thresholds: Arc<ThresholdStore>,
    engine: DecisionEngine,
    device: Arc<dyn DeviceActuator>,
    /// Held for the whole of a cycle or override.
    gate: Mutex<()>,
    /// Last successfully commanded state. Written only under `gate`.
    intent: RwLock<Option<DeviceState>>,
    phase: watch::Sender<CyclePhase>,
    last_report: RwLock<Option<CycleReport>>,
    cycle_count: AtomicU64,
    skip_unchanged: bool,
}

impl ControlCycle {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        thresholds: Arc<ThresholdStore>,
        engine: DecisionEngine,
        device: Arc<dyn DeviceActuator>,
    ) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            prices,
            thresholds,
            engine,
            device,
            gate: Mutex::new(()),
            intent: RwLock::new(None),
            phase,
            last_report: RwLock::new(None),
            cycle_count: AtomicU64::new(0),
            skip_unchanged: false,
        }
    }

    /// Skip the device call when the decision matches the last command.
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub fn last_intent(&self) -> Option<DeviceState> {
        match self.intent.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        match self.last_report.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    /// Run one cycle for the current time.
    pub async fn run(&self) -> CycleReport {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle as if the wall clock read `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> CycleReport {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!("Control cycle already in progress, skipping");
            return CycleReport::new(self.cycles_run(), now);
        };

        let cycle_number = self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;
        let report = CycleReport::new(cycle_number, now);
        let span = info_span!("cycle", id = %report.cycle_id, n = cycle_number);

        let report = self.run_locked(report, now).instrument(span).await;
        self.record(&report);
        report
    }

    async fn run_locked(&self, mut report: CycleReport, now: DateTime<Utc>) -> CycleReport {
        let phase = PhaseGuard(&self.phase);
        let previous = self.last_intent();

        phase.enter(CyclePhase::FetchingPrice);
        let (date, hour) = local_slot(self.prices.timezone(), now);
        let price = match self.prices.fetch(date, hour).await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "No price for this hour, leaving heat pump as is");
                report.outcome = CycleOutcome::PriceUnavailable(e);
                return report;
            }
        };

        phase.enter(CyclePhase::Deciding);
        let thresholds = self.thresholds.load();
        let decision = self.engine.decide(&price, thresholds, previous);
        report.price = Some(price.clone());
        report.thresholds = Some(thresholds);
        report.decision = Some(decision);

        if self.is_noop(&decision, previous) {
            info!(
                price = %price.value,
                thresholds = %thresholds,
                reason = ?decision.reason,
                state = ?previous,
                "No change needed"
            );
            report.outcome = CycleOutcome::Unchanged;
            return report;
        }

        phase.enter(CyclePhase::Actuating);
        report.outcome = match self.device.set_state(decision.on, decision.setpoint).await {
            Ok(()) => {
                let state = decision.as_device_state();
                self.set_intent(Some(state));
                info!(
                    price = %price.value,
                    thresholds = %thresholds,
                    reason = ?decision.reason,
                    state = %state,
                    "Heat pump updated"
                );
                CycleOutcome::Actuated(state)
            }
            Err(e) => {
                error!(
                    price = %price.value,
                    thresholds = %thresholds,
                    on = decision.on,
                    setpoint = ?decision.setpoint,
                    error = %e,
                    "Failed to actuate heat pump"
                );
                CycleOutcome::ActuationFailed(e)
            }
        };
        report
    }

    /// Manual override: command the device directly, bypassing the engine.
    pub async fn override_device(&self, on: bool) -> Result<DeviceState, ControlError> {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!(on, "Control cycle in progress, manual override skipped");
            return Err(ControlError::Busy);
        };
        let phase = PhaseGuard(&self.phase);
        phase.enter(CyclePhase::Actuating);

        let setpoint = on.then(|| self.engine.default_setpoint());
        if let Err(e) = self.device.set_state(on, setpoint).await {
            error!(on, ?setpoint, error = %e, "Manual override failed");
            return Err(e.into());
        }

        let state = DeviceState { on, setpoint };
        self.set_intent(Some(state));
        info!(state = %state, "Manual override applied");
        Ok(state)
    }

    fn is_noop(&self, decision: &DesiredState, previous: Option<DeviceState>) -> bool {
        if decision.reason.is_hold() {
            return true;
        }
        if !self.skip_unchanged {
            return false;
        }
        match previous {
            Some(prev) => prev.on == decision.on && (!decision.on || prev.setpoint == decision.setpoint),
            None => false,
        }
    }

    fn set_intent(&self, state: Option<DeviceState>) {
        match self.intent.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn record(&self, report: &CycleReport) {
        match self.last_report.write() {
            Ok(mut guard) => *guard = Some(report.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(report.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
