//! elprisetjustnu.se day-ahead price feed.
//!
//! API: `https://www.elprisetjustnu.se/api/v1/prices/{YYYY}/{MM}-{DD}_{AREA}.json`
//! Auth: None required.
//! Response: one JSON array per day, ordered by `time_start`, with prices
//! in SEK/kWh. Tomorrow's prices are published around 13:00 local time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use chrono_tz::Tz;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PriceSource;
use crate::config::PriceConfig;
use crate::types::{Price, PriceUnavailable, PriceUnavailableReason};

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// One slot of the daily price array. Only the fields we need.
#[derive(Debug, Deserialize)]
struct ElprisEntry {
    #[serde(rename = "SEK_per_kWh")]
    sek_per_kwh: Decimal,
    #[serde(default)]
    time_start: Option<DateTime<FixedOffset>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ElprisClient {
    http: Client,
    base_url: String,
    area: String,
    tz: Tz,
    unit_multiplier: Decimal,
    decimals: u32,
}

impl ElprisClient {
    pub fn new(base_url: &str, area: &str, tz: Tz, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SPOTHEAT/0.1.0")
            .build()
            .context("Failed to build HTTP client for the price feed")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            area: area.to_string(),
            tz,
            unit_multiplier: Decimal::from(100),
            decimals: 2,
        })
    }

    pub fn from_config(cfg: &PriceConfig) -> Result<Self> {
        let client = Self::new(&cfg.base_url, &cfg.area, cfg.tz()?, cfg.timeout())?
            .with_units(cfg.unit_multiplier, cfg.decimals);
        Ok(client)
    }

    /// Set the feed→display conversion (default ×100, 2 decimals).
    pub fn with_units(mut self, multiplier: u32, decimals: u32) -> Self {
        self.unit_multiplier = Decimal::from(multiplier);
        self.decimals = decimals;
        self
    }

    fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}/{:02}-{:02}_{}.json",
            self.base_url,
            date.year(),
            date.month(),
            date.day(),
            self.area,
        )
    }

    /// Pick the entry for `hour`.
    ///
    /// Entries carrying `time_start` are matched on their local start hour,
    /// which stays correct on DST days and for quarter-hour feeds (the first
    /// slot of the hour wins). Otherwise the array index is the hour.
    fn select_entry<'a>(
        &self,
        entries: &'a [ElprisEntry],
        date: NaiveDate,
        hour: u32,
    ) -> Option<&'a ElprisEntry> {
        let timed = !entries.is_empty() && entries.iter().all(|e| e.time_start.is_some());
        if timed {
            return entries.iter().find(|e| {
                e.time_start
                    .map(|start| {
                        let local = start.with_timezone(&self.tz);
                        local.date_naive() == date && local.hour() == hour
                    })
                    .unwrap_or(false)
            });
        }

        if entries.len() < hour as usize + 1 {
            return None;
        }
        entries.get(hour as usize)
    }

    /// `None` when the scaled price does not fit in a `Decimal`.
    fn to_display_unit(&self, base: Decimal) -> Option<Decimal> {
        base.checked_mul(self.unit_multiplier)
            .map(|v| v.round_dp(self.decimals))
    }
}

#[async_trait]
impl PriceSource for ElprisClient {
    async fn fetch(&self, date: NaiveDate, hour: u32) -> Result<Price, PriceUnavailable> {
        let unavailable = |reason| PriceUnavailable { date, hour, reason };

        if hour > 23 {
            return Err(unavailable(PriceUnavailableReason::InvalidHour));
        }

        let url = self.url_for(date);
        debug!(url = %url, "Fetching spot prices");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Price feed request failed");
            unavailable(PriceUnavailableReason::Transport(e.to_string()))
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Price feed returned an error status");
            return Err(unavailable(PriceUnavailableReason::Status(status.as_u16())));
        }

        let entries: Vec<ElprisEntry> = resp.json().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse price feed response");
            unavailable(PriceUnavailableReason::Malformed(e.to_string()))
        })?;

        let entry = self.select_entry(&entries, date, hour).ok_or_else(|| {
            warn!(%date, hour, entries = entries.len(), "No price data for hour");
            unavailable(PriceUnavailableReason::MissingHour {
                entries: entries.len(),
            })
        })?;

        let value = self.to_display_unit(entry.sek_per_kwh).ok_or_else(|| {
            warn!(%date, hour, raw = %entry.sek_per_kwh, "Price out of range");
            unavailable(PriceUnavailableReason::Malformed("price out of range".into()))
        })?;
        info!(%date, hour, area = %self.area, price = %value, "Current price: {value} öre/kWh");

        Ok(Price {
            value,
            hour,
            date,
            area: self.area.clone(),
        })
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use chrono_tz::Europe::Stockholm;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    /// `count` hourly entries for 2026-01-15 in Stockholm (+01:00), priced
    /// 0.10, 0.11, ... SEK/kWh.
    fn hourly_entries(count: u32) -> Value {
        let entries: Vec<Value> = (0..count)
            .map(|h| {
                json!({
                    "SEK_per_kWh": 0.10 + f64::from(h) / 100.0,
                    "EUR_per_kWh": 0.01,
                    "EXR": 11.2,
                    "time_start": format!("2026-01-15T{h:02}:00:00+01:00"),
                    "time_end": format!("2026-01-15T{h:02}:59:59+01:00"),
                })
            })
            .collect();
        Value::Array(entries)
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1/prices")
    }

    async fn client_for(body: Value) -> ElprisClient {
        let app = Router::new().route(
            "/api/v1/prices/:year/:file",
            get(move |Path((year, file)): Path<(String, String)>| {
                let body = body.clone();
                async move {
                    if year == "2026" && file == "01-15_SE3.json" {
                        (StatusCode::OK, Json(body))
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
                    }
                }
            }),
        );
        let base = serve(app).await;
        ElprisClient::new(&base, "SE3", Stockholm, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_url_format() {
        let client = ElprisClient::new(
            "https://www.elprisetjustnu.se/api/v1/prices/",
            "SE3",
            Stockholm,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            client.url_for(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()),
            "https://www.elprisetjustnu.se/api/v1/prices/2026/03-07_SE3.json"
        );
    }

    #[test]
    fn test_display_unit_rounding() {
        let client =
            ElprisClient::new("http://localhost", "SE3", Stockholm, Duration::from_secs(1)).unwrap();
        assert_eq!(client.to_display_unit(dec!(0.045)), Some(dec!(4.50)));
        assert_eq!(client.to_display_unit(dec!(1.234567)), Some(dec!(123.46)));
        assert_eq!(client.to_display_unit(Decimal::MAX), None);
    }

    #[tokio::test]
    async fn test_fetch_selects_current_hour() {
        let client = client_for(hourly_entries(24)).await;
        let price = client.fetch(date(), 5).await.unwrap();
        assert_eq!(price.value, dec!(15.00));
        assert_eq!(price.hour, 5);
        assert_eq!(price.date, date());
        assert_eq!(price.area, "SE3");
    }

    #[tokio::test]
    async fn test_fetch_missing_hour() {
        let client = client_for(hourly_entries(20)).await;
        let err = client.fetch(date(), 21).await.unwrap_err();
        assert_eq!(err.reason, PriceUnavailableReason::MissingHour { entries: 20 });
    }

    #[tokio::test]
    async fn test_fetch_untimed_entries_use_index() {
        let body = json!([{"SEK_per_kWh": 0.5}, {"SEK_per_kWh": 0.7}]);
        let client = client_for(body).await;
        assert_eq!(client.fetch(date(), 1).await.unwrap().value, dec!(70.00));

        let err = client.fetch(date(), 2).await.unwrap_err();
        assert_eq!(err.reason, PriceUnavailableReason::MissingHour { entries: 2 });
    }

    #[tokio::test]
    async fn test_fetch_quarter_hour_feed() {
        let entries: Vec<Value> = (0..96)
            .map(|i| {
                json!({
                    "SEK_per_kWh": f64::from(i) / 1000.0,
                    "time_start": format!("2026-01-15T{:02}:{:02}:00+01:00", i / 4, (i % 4) * 15),
                })
            })
            .collect();
        let client = client_for(Value::Array(entries)).await;
        // 10:00 is slot 40 → 0.040 SEK → 4.00 öre
        assert_eq!(client.fetch(date(), 10).await.unwrap().value, dec!(4.00));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let client = client_for(json!({"unexpected": true})).await;
        let err = client.fetch(date(), 3).await.unwrap_err();
        assert!(matches!(err.reason, PriceUnavailableReason::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_price_out_of_range() {
        let client = client_for(json!([{"SEK_per_kWh": 7e28}])).await;
        let err = client.fetch(date(), 0).await.unwrap_err();
        assert!(matches!(err.reason, PriceUnavailableReason::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_not_published() {
        let client = client_for(hourly_entries(24)).await;
        let tomorrow = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        let err = client.fetch(tomorrow, 3).await.unwrap_err();
        assert_eq!(err.reason, PriceUnavailableReason::Status(404));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_feed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ElprisClient::new(
            &format!("http://{addr}"),
            "SE3",
            Stockholm,
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client.fetch(date(), 3).await.unwrap_err();
        assert!(matches!(err.reason, PriceUnavailableReason::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_hour() {
        let client = client_for(hourly_entries(24)).await;
        let err = client.fetch(date(), 24).await.unwrap_err();
        assert_eq!(err.reason, PriceUnavailableReason::InvalidHour);
    }
}
