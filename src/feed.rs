// ===============================
// src/feed.rs
// ===============================
//
// Market data feed (CoinGecko-compatible REST):
// - fetch_spot    : /simple/price  -> spot (quote + local currency) + 24h change
// - fetch_history : /coins/{id}/market_chart?days=N -> formatted series
// - fetch         : spot + history, never fails; any error -> fallback series
//                   with `degraded = true`
//
// Notes:
// - 1H uses the 1-day window cut to the trailing 60 minutes of that window.
// - change_percent comes from the formatted series; the provider's 24h change
//   is only handed to `on_spot` as a provisional value.
//
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{change_percent, MarketSnapshot, PricePoint, TimeRange};
use crate::fallback::{self, DEFAULT_POINT_COUNT};
use crate::metrics::FEED_FETCHES;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("unexpected payload: {0}")]
    Shape(String),
    #[error("provider returned an empty series")]
    EmptySeries,
    #[error("feed is offline")]
    Offline,
}

#[derive(Debug, Clone)]
pub struct FeedCfg {
    pub base_url: String,
    pub asset_id: String,
    pub quote_currency: String,
    pub local_currency: String,
    pub timeout: Duration,
    pub display_offset: FixedOffset,
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotQuote {
    pub price: f64,
    pub local_price: Option<f64>,
    pub change_24h: f64,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>, // [ms, price]
}

#[derive(Debug, Clone)]
pub struct MarketFeed {
    http: reqwest::Client,
    cfg: FeedCfg,
}

impl MarketFeed {
    pub fn new(cfg: FeedCfg) -> Self {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(?e, "http client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self { http, cfg }
    }

    pub async fn fetch(&self, range: TimeRange) -> MarketSnapshot {
        self.fetch_observed(range, |_| {}).await
    }

    /// Same as `fetch`, but reports the spot quote as soon as it arrives so the
    /// caller can publish a provisional price before the series lands.
    pub async fn fetch_observed<F>(&self, range: TimeRange, mut on_spot: F) -> MarketSnapshot
    where
        F: FnMut(&SpotQuote),
    {
        match self.try_fetch(range, &mut on_spot).await {
            Ok(snap) => {
                FEED_FETCHES.with_label_values(&["live", range.as_str()]).inc();
                info!(%range, price = snap.reference_price, points = snap.series.len(), "market snapshot");
                snap
            }
            Err(e) => {
                FEED_FETCHES.with_label_values(&["degraded", range.as_str()]).inc();
                match e {
                    FeedError::Offline => debug!(%range, "feed offline, using fallback series"),
                    _ => warn!(%range, error = %e, "price feed failed, using fallback series"),
                }
                self.degraded(range, Utc::now())
            }
        }
    }

    async fn try_fetch<F>(&self, range: TimeRange, on_spot: &mut F) -> Result<MarketSnapshot, FeedError>
    where
        F: FnMut(&SpotQuote),
    {
        if !self.cfg.live {
            return Err(FeedError::Offline);
        }
        let spot = self.fetch_spot().await?;
        on_spot(&spot);

        let series = self.fetch_history(range).await?;
        if series.is_empty() {
            return Err(FeedError::EmptySeries);
        }
        Ok(MarketSnapshot {
            change_percent: change_percent(&series),
            series,
            reference_price: spot.price,
            local_price: spot.local_price,
            range,
            degraded: false,
            provisional: false,
            fetched_at: Utc::now(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FeedError> {
        let rsp = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(FeedError::Status(rsp.status().as_u16()));
        }
        let text = rsp.text().await?;
        serde_json::from_str(&text).map_err(|e| FeedError::Shape(e.to_string()))
    }

    pub async fn fetch_spot(&self) -> Result<SpotQuote, FeedError> {
        let url = format!("{}/simple/price", self.cfg.base_url.trim_end_matches('/'));
        let currencies = if self.cfg.local_currency == self.cfg.quote_currency {
            self.cfg.quote_currency.clone()
        } else {
            format!("{},{}", self.cfg.quote_currency, self.cfg.local_currency)
        };
        let body = self
            .get_json(
                &url,
                &[
                    ("ids", self.cfg.asset_id.clone()),
                    ("vs_currencies", currencies),
                    ("include_24hr_change", "true".to_string()),
                ],
            )
            .await?;
        parse_spot(&body, &self.cfg.asset_id, &self.cfg.quote_currency, &self.cfg.local_currency)
    }

    pub async fn fetch_history(&self, range: TimeRange) -> Result<Vec<PricePoint>, FeedError> {
        let url = format!(
            "{}/coins/{}/market_chart",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.asset_id
        );
        let body = self
            .get_json(
                &url,
                &[
                    ("vs_currency", self.cfg.quote_currency.clone()),
                    ("days", range.provider_days().to_string()),
                ],
            )
            .await?;
        let chart: MarketChart = serde_json::from_value(body).map_err(|e| FeedError::Shape(e.to_string()))?;
        Ok(format_series(range, &chart.prices, self.cfg.display_offset))
    }

    /// Snapshot dari fallback generator.
    pub fn degraded(&self, range: TimeRange, now: DateTime<Utc>) -> MarketSnapshot {
        let mut rng = fallback::clock_rng();
        let series = fallback::generate(range, DEFAULT_POINT_COUNT, now, self.cfg.display_offset, &mut rng);
        degraded_snapshot(range, series, now)
    }
}

pub fn degraded_snapshot(range: TimeRange, series: Vec<PricePoint>, now: DateTime<Utc>) -> MarketSnapshot {
    MarketSnapshot {
        reference_price: series.last().map(|p| p.price).unwrap_or(0.0),
        local_price: None,
        change_percent: change_percent(&series),
        series,
        range,
        degraded: true,
        provisional: false,
        fetched_at: now,
    }
}

fn parse_spot(body: &Value, asset: &str, quote: &str, local: &str) -> Result<SpotQuote, FeedError> {
    let entry = body
        .get(asset)
        .ok_or_else(|| FeedError::Shape(format!("missing asset `{asset}`")))?;
    let price = entry
        .get(quote)
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| FeedError::Shape(format!("missing `{quote}` price")))?;
    let local_price = entry.get(local).and_then(Value::as_f64).filter(|p| p.is_finite() && *p > 0.0);
    let change_24h = entry
        .get(format!("{quote}_24h_change"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    Ok(SpotQuote { price, local_price, change_24h })
}

/// Provider samples -> labelled series. Non-positive prices are dropped.
pub fn format_series(range: TimeRange, samples: &[(f64, f64)], offset: FixedOffset) -> Vec<PricePoint> {
    let newest_ms = samples.iter().map(|(t, _)| *t).fold(f64::MIN, f64::max);
    let cutoff_ms = match range {
        TimeRange::H1 => newest_ms - range.span().num_milliseconds() as f64,
        _ => f64::MIN,
    };
    samples
        .iter()
        .filter(|(t, p)| *t >= cutoff_ms && p.is_finite() && *p > 0.0)
        .filter_map(|(t, p)| {
            let ts = Utc.timestamp_millis_opt(*t as i64).single()?;
            Some(PricePoint { label: fallback::format_label(range, ts, offset), price: *p })
        })
        .collect()
}
