//! Function-level interface for the outer web layer.
//!
//! Every operation returns a value or a `ControlError`; nothing here
//! panics, and a failed call leaves thresholds and intent as they were.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::cycle::{ControlCycle, CycleOutcome, CyclePhase, CycleReport};
use crate::price::{local_slot, PriceSource};
use crate::storage::ThresholdStore;
use crate::types::{ControlError, DeviceState, Price, ThresholdConfig};

/// Snapshot of the controller for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    pub phase: CyclePhase,
    pub thresholds: ThresholdConfig,
    pub last_intent: Option<DeviceState>,
    pub cycles_run: u64,
    pub last_cycle: Option<CycleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub cycle_number: u64,
    pub started_at: String,
    pub price: Option<Price>,
    pub on: Option<bool>,
    pub outcome: &'static str,
    pub error: Option<String>,
}

impl From<&CycleReport> for CycleSummary {
    fn from(report: &CycleReport) -> Self {
        Self {
            cycle_id: report.cycle_id.to_string(),
            cycle_number: report.cycle_number,
            started_at: report.started_at.to_rfc3339(),
            price: report.price.clone(),
            on: report.decision.map(|d| d.on),
            outcome: report.outcome.label(),
            error: report.outcome.error(),
        }
    }
}

pub struct ControlService {
    cycle: Arc<ControlCycle>,
    thresholds: Arc<ThresholdStore>,
    prices: Arc<dyn PriceSource>,
}

impl ControlService {
    pub fn new(
        cycle: Arc<ControlCycle>,
        thresholds: Arc<ThresholdStore>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            cycle,
            thresholds,
            prices,
        }
    }

    /// Refresh: run a control cycle and return the price it used.
    ///
    /// If a cycle is already in flight the price is fetched without
    /// actuating. An actuation failure does not hide the price; it is
    /// logged and visible in `status()`.
    pub async fn current_price(&self) -> Result<Price, ControlError> {
        let report = self.cycle.run().await;
        match report.outcome {
            CycleOutcome::PriceUnavailable(e) => Err(e.into()),
            CycleOutcome::Skipped => {
                let (date, hour) = local_slot(self.prices.timezone(), Utc::now());
                Ok(self.prices.fetch(date, hour).await?)
            }
            _ => match report.price {
                Some(price) => Ok(price),
                None => {
                    warn!(cycle = report.cycle_number, "Cycle finished without a price");
                    let (date, hour) = local_slot(self.prices.timezone(), Utc::now());
                    Ok(self.prices.fetch(date, hour).await?)
                }
            },
        }
    }

    pub fn threshold(&self) -> ThresholdConfig {
        self.thresholds.load()
    }

    pub fn set_threshold(&self, cfg: ThresholdConfig) -> Result<ThresholdConfig, ControlError> {
        let saved = self.thresholds.save(cfg)?;
        info!(thresholds = %saved, "Threshold updated");
        Ok(saved)
    }

    /// Manual override, bypassing the decision engine.
    pub async fn set_device(&self, on: bool) -> Result<DeviceState, ControlError> {
        self.cycle.override_device(on).await
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            phase: self.cycle.phase(),
            thresholds: self.thresholds.load(),
            last_intent: self.cycle.last_intent(),
            cycles_run: self.cycle.cycles_run(),
            last_cycle: self.cycle.last_report().as_ref().map(CycleSummary::from),
        }
    }
}
