use std::{env, time::Duration};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, TimeZone, Utc};
use itertools::Itertools;
use reqwest::{Client, header};
use tokio::time::sleep;
use tracing::info;

use crate::signal::PriceSeries;

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-call attempt cap; a coin that still fails is skipped for the run.
const MAX_ATTEMPTS: usize = 3;

/// Market-data lookups the jobs depend on. Implemented by [`CoinGecko`] and
/// by in-memory fakes in the job tests.
#[allow(async_fn_in_trait)]
pub trait MarketData {
    async fn current_price(&self, coin: &str) -> Result<Option<f64>>;
    async fn daily_series(&self, coin: &str, days: u32) -> Result<PriceSeries>;
}

/// CoinGecko client. One quote currency for the process lifetime.
#[derive(Debug, Clone)]
pub struct CoinGecko {
    client: Client,
    base_url: String,
    vs: String,
}

impl CoinGecko {
    /// Build the shared HTTP client. An API key from `COINGECKO_API_KEY` is
    /// attached when present; the public endpoints work without one.
    pub fn new(vs: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Ok(key) = env::var("COINGECKO_API_KEY") {
            headers.insert("x-cg-pro-api-key", header::HeaderValue::from_str(&key)?);
        }
        let client = Client::builder()
            .default_headers(headers)
            .user_agent("crypto-watcher/0.1 (rust)")
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            vs: vs.to_string(),
        })
    }

    pub fn vs(&self) -> &str {
        &self.vs
    }

    /// GET with a small bounded retry honoring Retry-After on throttling.
    async fn get_json(&self, url: reqwest::Url) -> Result<serde_json::Value> {
        let mut attempt = 0usize;
        loop {
            let resp = self.client.get(url.clone()).send().await?;
            if resp.status().is_success() {
                return Ok(resp.json().await?);
            }
            let status = resp.status();
            attempt += 1;
            if attempt >= MAX_ATTEMPTS {
                let txt = resp.text().await.unwrap_or_default();
                bail!("HTTP {} after {} attempts; body: {}", status, attempt, txt);
            }
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let backoff_ms = retry_after
                .map(|s| s * 1000)
                .unwrap_or(300 * attempt as u64);
            info!("{} -> retrying in {}ms", status, backoff_ms);
            sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

impl MarketData for CoinGecko {
    /// Spot price via `/simple/price`. `Ok(None)` means CoinGecko does not
    /// know the coin; transport and decode problems surface as `Err`.
    async fn current_price(&self, coin: &str) -> Result<Option<f64>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/simple/price", self.base_url),
            &[("ids", coin), ("vs_currencies", self.vs.as_str())],
        )?;
        let val = self.get_json(url).await.context("simple/price")?;
        Ok(val
            .get(coin)
            .and_then(|c| c.get(&self.vs))
            .and_then(|p| p.as_f64()))
    }

    /// Daily close history via `/coins/{id}/market_chart`, normalized to one
    /// sample per UTC date (the last sample of a date wins), ascending.
    async fn daily_series(&self, coin: &str, days: u32) -> Result<PriceSeries> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/coins/{}/market_chart", self.base_url, coin),
            &[
                ("vs_currency", self.vs.clone()),
                ("days", days.to_string()),
                ("interval", "daily".into()),
            ],
        )?;
        let val = self
            .get_json(url)
            .await
            .with_context(|| format!("market_chart for {}", coin))?;

        let mut samples: Vec<(NaiveDate, f64)> = vec![];
        if let Some(rows) = val.get("prices").and_then(|p| p.as_array()) {
            for row in rows {
                if let Some(pair) = row.as_array()
                    && pair.len() >= 2
                {
                    let ts_ms = pair[0]
                        .as_f64()
                        .or_else(|| pair[0].as_i64().map(|x| x as f64))
                        .unwrap_or(0.0);
                    let ts = (ts_ms / 1000.0) as i64;
                    let date = Utc.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive());
                    if let (Some(date), Some(price)) = (date, pair[1].as_f64()) {
                        samples.push((date, price));
                    }
                }
            }
        }

        samples.sort_by_key(|(date, _)| *date);
        let mut series = PriceSeries::default();
        for (date, group) in &samples.into_iter().chunk_by(|(date, _)| *date) {
            if let Some((_, price)) = group.last() {
                series.dates.push(date);
                series.prices.push(price);
            }
        }
        Ok(series)
    }
}
