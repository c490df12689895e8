//! In-process stand-in for the price feed and the Sensibo API.
//!
//! One axum server hosts both under `/prices` and `/sensibo`. Prices,
//! command latency and the response status are controllable from test
//! code; every accepted command body is recorded.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Stockholm;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spotheat::device::sensibo::SensiboClient;
use spotheat::device::RetryPolicy;
use spotheat::price::elpris::ElprisClient;

pub const MIN_TEMP: i32 = 10;
pub const DEFAULT_TEMP: i32 = 22;

/// 20:30 UTC on 2026-01-15 is 21:30 in Stockholm.
pub fn evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 20, 30, 0).unwrap()
}

#[derive(Default)]
struct CloudState {
    /// SEK/kWh per hour, untimed. Served for every date.
    prices: Vec<f64>,
    commands: Vec<Value>,
    command_delay: Duration,
    command_status: Option<u16>,
}

pub struct FakeCloud {
    base: String,
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(CloudState {
            prices: vec![0.50; 24],
            ..Default::default()
        }));

        let app = Router::new()
            .route("/prices/:year/:file", get(get_prices))
            .route("/sensibo/pods/:id/acStates", post(post_ac_state))
            .route("/sensibo/pods/:id", get(get_pod))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    /// Publish `count` hourly prices, all `sek_per_kwh`.
    pub fn set_flat_prices(&self, sek_per_kwh: f64, count: usize) {
        self.state.lock().unwrap().prices = vec![sek_per_kwh; count];
    }

    pub fn set_command_delay(&self, delay: Duration) {
        self.state.lock().unwrap().command_delay = delay;
    }

    pub fn reject_commands_with(&self, status: u16) {
        self.state.lock().unwrap().command_status = Some(status);
    }

    pub fn commands(&self) -> Vec<Value> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn price_client(&self) -> ElprisClient {
        ElprisClient::new(
            &format!("{}/prices", self.base),
            "SE3",
            Stockholm,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    pub fn device_client(&self) -> SensiboClient {
        SensiboClient::new(
            &format!("{}/sensibo", self.base),
            Some(SecretString::new("test-key".into())),
            Some("pod-1".into()),
            MIN_TEMP,
            DEFAULT_TEMP,
            Duration::from_secs(2),
        )
        .unwrap()
        .with_retry(RetryPolicy {
            max_retries: 0,
            base_backoff: Duration::from_millis(10),
        })
    }
}

async fn get_prices(
    State(state): State<Arc<Mutex<CloudState>>>,
    Path((_year, file)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    if !file.ends_with("_SE3.json") {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})));
    }
    let prices = state.lock().unwrap().prices.clone();
    let entries: Vec<Value> = prices
        .into_iter()
        .map(|p| json!({"SEK_per_kWh": p, "EUR_per_kWh": p / 11.0, "EXR": 11.0}))
        .collect();
    (StatusCode::OK, Json(Value::Array(entries)))
}

async fn post_ac_state(
    State(state): State<Arc<Mutex<CloudState>>>,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let delay = state.lock().unwrap().command_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut guard = state.lock().unwrap();
    if let Some(code) = guard.command_status {
        return (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"status": "error", "reason": "rejected"})),
        );
    }
    guard.commands.push(body);
    (StatusCode::OK, Json(json!({"status": "success"})))
}

async fn get_pod(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "result": {
            "acState": {"on": false, "targetTemperature": 10, "mode": "fan"},
            "measurements": {"temperature": 20.0}
        }
    }))
}
