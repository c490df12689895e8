//! SPOTHEAT — spot-price driven heat pump controller
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the price feed, threshold store and heat pump client together,
//! then runs the fetch→decide→actuate cycle on a fixed interval with
//! graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use spotheat::config;
use spotheat::dashboard;
use spotheat::device::sensibo::SensiboClient;
use spotheat::device::DeviceActuator;
use spotheat::engine::cycle::{ControlCycle, CycleReport};
use spotheat::engine::decision::DecisionEngine;
use spotheat::engine::service::ControlService;
use spotheat::price::elpris::ElprisClient;
use spotheat::price::PriceSource;
use spotheat::storage::ThresholdStore;

const BANNER: &str = r#"
 ____  ____   ___ _____ _   _ _____    _  _____
/ ___||  _ \ / _ \_   _| | | | ____|  / \|_   _|
\___ \| |_) | | | || | | |_| |  _|   / _ \ | |
 ___) |  __/| |_| || | |  _  | |___ / ___ \| |
|____/|_|    \___/ |_| |_| |_|_____/_/   \_\_|

  Spot-price heat pump controller
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.controller.name,
        interval_secs = cfg.controller.cycle_interval_secs,
        area = %cfg.price.area,
        min_temp = cfg.device.min_temp,
        default_temp = cfg.device.default_temp,
        "SPOTHEAT starting up"
    );

    // -- Initialise components -------------------------------------------

    let prices: Arc<dyn PriceSource> = Arc::new(ElprisClient::from_config(&cfg.price)?);
    let device: Arc<dyn DeviceActuator> = Arc::new(SensiboClient::from_config(&cfg.device)?);

    let thresholds = Arc::new(ThresholdStore::new(&cfg.thresholds.path));
    info!(
        path = %thresholds.path().display(),
        thresholds = %thresholds.load(),
        "Thresholds loaded"
    );

    let cycle = Arc::new(
        ControlCycle::new(
            prices.clone(),
            thresholds.clone(),
            DecisionEngine::new(cfg.device.default_temp),
            device,
        )
        .with_skip_unchanged(cfg.controller.skip_unchanged),
    );
    let service = Arc::new(ControlService::new(cycle.clone(), thresholds, prices));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(service.clone(), cfg.dashboard.port).await?;
    } else {
        warn!("Dashboard disabled, running scheduled cycles only");
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.controller.cycle_interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.controller.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = cycle.run().await;
                log_cycle_report(&report);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(
        cycles = cycle.cycles_run(),
        last_state = ?cycle.last_intent(),
        "SPOTHEAT shut down cleanly."
    );

    Ok(())
}

/// Log a one-line cycle summary.
fn log_cycle_report(report: &CycleReport) {
    let price = report.price.as_ref().map(|p| p.value.to_string());
    if let Some(e) = report.outcome.error() {
        error!(
            cycle = report.cycle_number,
            outcome = report.outcome.label(),
            price = ?price,
            error = %e,
            "Cycle complete"
        );
    } else {
        info!(
            cycle = report.cycle_number,
            outcome = report.outcome.label(),
            price = ?price,
            decision = ?report.decision.map(|d| d.on),
            "Cycle complete"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spotheat=info"));

    let json_logging = std::env::var("SPOTHEAT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
