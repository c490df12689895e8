//! Threshold persistence.
//!
//! Keeps the active `ThresholdConfig` in a single JSON document on disk.
//! Reads never fail: a missing or unreadable document yields the default
//! configuration. Writes are validated first and go through a temp file
//! + rename so a crash mid-write cannot leave a truncated document.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::types::{ThresholdConfig, ThresholdError};

/// Default threshold document path.
pub const DEFAULT_THRESHOLD_FILE: &str = "threshold.json";

/// Accepted threshold document layouts, on disk and in update requests.
/// The legacy layout predates hysteresis mode.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ThresholdDocument {
    Current(ThresholdConfig),
    Legacy { price_threshold: Decimal },
}

impl From<ThresholdDocument> for ThresholdConfig {
    fn from(stored: ThresholdDocument) -> Self {
        match stored {
            ThresholdDocument::Current(cfg) => cfg,
            ThresholdDocument::Legacy { price_threshold } => {
                info!(%price_threshold, "Migrating legacy single-threshold document");
                ThresholdConfig::Single {
                    threshold: price_threshold,
                }
            }
        }
    }
}

pub struct ThresholdStore {
    path: PathBuf,
    default: ThresholdConfig,
    /// Last good configuration read from or written to disk.
    cached: RwLock<Option<ThresholdConfig>>,
    /// Serializes the validate-write-publish sequence of `save`.
    write_lock: Mutex<()>,
}

impl ThresholdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_default(path, ThresholdConfig::default())
    }

    pub fn with_default(path: impl Into<PathBuf>, default: ThresholdConfig) -> Self {
        Self {
            path: path.into(),
            default,
            cached: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration. Loaded lazily on first call.
    pub fn load(&self) -> ThresholdConfig {
        if let Some(cfg) = self.cached.read().ok().and_then(|c| *c) {
            return cfg;
        }

        match self.read_from_disk() {
            Ok(Some(cfg)) => {
                if let Ok(mut cached) = self.cached.write() {
                    *cached = Some(cfg);
                }
                cfg
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No thresholds stored, using default");
                self.default
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    default = %self.default,
                    "Failed to read thresholds, using default"
                );
                self.default
            }
        }
    }

    /// Validate and persist a new configuration.
    ///
    /// On any error the previously loaded configuration stays in effect.
    pub fn save(&self, cfg: ThresholdConfig) -> Result<ThresholdConfig, ThresholdError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ThresholdError::Storage("threshold writer lock poisoned".into()))?;

        if let Err(e) = cfg.validate() {
            warn!(thresholds = %cfg, error = %e, "Rejected threshold update");
            return Err(e);
        }

        if let Err(e) = self.write_to_disk(&cfg) {
            error!(path = %self.path.display(), error = %e, "Failed to save thresholds");
            return Err(e);
        }

        if let Ok(mut cached) = self.cached.write() {
            *cached = Some(cfg);
        }
        info!(thresholds = %cfg, "Thresholds saved");
        Ok(cfg)
    }

    fn read_from_disk(&self) -> Result<Option<ThresholdConfig>, ThresholdError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| ThresholdError::Storage(format!("read failed: {e}")))?;
        let stored: ThresholdDocument = serde_json::from_str(&json)
            .map_err(|e| ThresholdError::Storage(format!("parse failed: {e}")))?;

        let cfg = ThresholdConfig::from(stored);
        cfg.validate()?;
        Ok(Some(cfg))
    }

    fn write_to_disk(&self, cfg: &ThresholdConfig) -> Result<(), ThresholdError> {
        let json = serde_json::to_string_pretty(cfg)
            .map_err(|e| ThresholdError::Storage(format!("serialise failed: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)
            .map_err(|e| ThresholdError::Storage(format!("write to {} failed: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            ThresholdError::Storage(format!("rename to {} failed: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
