//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ControlService>`.
//! Failures are logged in full by the core and reported here with a
//! generic message.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::engine::service::{ControlService, ControlStatus};
use crate::storage::ThresholdDocument;
use crate::types::{ActuationError, ControlError, DeviceState, ThresholdConfig, ThresholdError};

pub type AppState = Arc<ControlService>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PriceResponse {
    pub price: Decimal,
    pub hour: u32,
    pub date: NaiveDate,
    pub area: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdUpdated {
    pub status: &'static str,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRequest {
    pub on: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceResponse {
    pub status: &'static str,
    pub state: DeviceState,
}

/// A `ControlError` with the user-facing message for the failed action.
pub struct ApiError {
    error: ControlError,
    message: &'static str,
}

impl ApiError {
    fn new(error: ControlError, message: &'static str) -> Self {
        Self { error, message }
    }

    fn status_code(&self) -> StatusCode {
        match &self.error {
            ControlError::Busy => StatusCode::CONFLICT,
            ControlError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::Threshold(ThresholdError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ControlError::Threshold(ThresholdError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ControlError::Actuation(ActuationError::Unsafe { .. }) => StatusCode::BAD_REQUEST,
            ControlError::Actuation(ActuationError::NotConfigured(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ControlError::Actuation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self.error {
            ControlError::Busy => "Another control cycle is in progress",
            _ => self.message,
        };
        (self.status_code(), Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/price. Refresh: runs a control cycle and reports its price.
pub async fn get_price(State(svc): State<AppState>) -> Result<Json<PriceResponse>, ApiError> {
    let price = svc
        .current_price()
        .await
        .map_err(|e| ApiError::new(e, "Failed to fetch electricity price"))?;

    Ok(Json(PriceResponse {
        price: price.value,
        hour: price.hour,
        date: price.date,
        area: price.area,
    }))
}

/// GET /api/threshold
pub async fn get_threshold(State(svc): State<AppState>) -> Json<ThresholdConfig> {
    Json(svc.threshold())
}

/// POST /api/threshold
pub async fn set_threshold(
    State(svc): State<AppState>,
    body: Result<Json<ThresholdDocument>, JsonRejection>,
) -> Result<Json<ThresholdUpdated>, ApiError> {
    let Json(doc) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Unreadable threshold update");
        ApiError::new(
            ControlError::Threshold(ThresholdError::Invalid(rejection.body_text())),
            "Invalid or unsaved threshold",
        )
    })?;
    let thresholds = svc
        .set_threshold(ThresholdConfig::from(doc))
        .map_err(|e| ApiError::new(e, "Invalid or unsaved threshold"))?;

    Ok(Json(ThresholdUpdated {
        status: "Threshold updated",
        thresholds,
    }))
}

/// POST /api/device. Manual override.
pub async fn set_device(
    State(svc): State<AppState>,
    Json(req): Json<DeviceRequest>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let (done, failed) = if req.on {
        ("Heat pump turned on", "Failed to turn on heat pump")
    } else {
        ("Heat pump turned off", "Failed to turn off heat pump")
    };

    let state = svc
        .set_device(req.on)
        .await
        .map_err(|e| ApiError::new(e, failed))?;

    Ok(Json(DeviceResponse {
        status: done,
        state,
    }))
}

/// GET /api/status
pub async fn get_status(State(svc): State<AppState>) -> Json<ControlStatus> {
    Json(svc.status())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
