//! Spot price acquisition.
//!
//! Defines the `PriceSource` trait and the elprisetjustnu.se day-ahead
//! feed implementation.

pub mod elpris;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

#[cfg(test)]
use mockall::automock;

use crate::types::{Price, PriceUnavailable};

/// Abstraction over day-ahead price feeds.
///
/// Implementors never panic on bad feed data: every failure is reported
/// as `PriceUnavailable` so the caller can skip the cycle.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the price for `hour` (local, 0–23) on the local `date`.
    async fn fetch(&self, date: NaiveDate, hour: u32) -> Result<Price, PriceUnavailable>;

    /// The feed's reference timezone, used to resolve day/hour boundaries.
    fn timezone(&self) -> Tz;
}

/// Resolve a UTC instant to the feed-local (date, hour) pair.
pub fn local_slot(tz: Tz, now: DateTime<Utc>) -> (NaiveDate, u32) {
    let local = now.with_timezone(&tz);
    (local.date_naive(), local.hour())
}
