//! CoinGecko Pro `/coins/{id}/ohlc/range` client — the one concrete
//! [`ExternalDataSource`] implementation shipped with this crate. Normalizes
//! the exchange's per-request record cap, ms-since-epoch timestamps, and
//! pagination, reusing the retry/backoff shape of the original CSV exporter
//! this crate evolved from.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use itertools::Itertools;
use reqwest::{header, Client};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::{Instrument, Ohlcv, Price, TimeRange};
use crate::error::ExternalFetchError;
use crate::source::rate_limit::RateLimiter;
use crate::source::ExternalDataSource;

/// Exchange record cap per request, in days (the documented kline-range
/// quirk: one request covers at most this many days before the exchange
/// truncates the response).
const MAX_DAYS_PER_REQUEST: i64 = 180;

pub struct CoinGeckoSource {
    client: Client,
    vs_currency: String,
    rate_limiter: RateLimiter,
    max_retry_attempts: usize,
}

fn coin_id(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Btc => "bitcoin",
        Instrument::Eth => "ethereum",
    }
}

impl CoinGeckoSource {
    /// `timeout` bounds each individual HTTP call (§5: "External HTTP:
    /// per-call deadline"); `max_retry_attempts` bounds the 429/5xx backoff
    /// loop in [`Self::get_json`].
    pub fn new(
        api_key: &str,
        vs_currency: impl Into<String>,
        rate_limiter: RateLimiter,
        timeout: Duration,
        max_retry_attempts: usize,
    ) -> Result<Self, ExternalFetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-cg-pro-api-key",
            header::HeaderValue::from_str(api_key).map_err(|e| ExternalFetchError::Failed {
                source_id: "coingecko".into(),
                symbol: "*".into(),
                message: e.to_string(),
            })?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .user_agent("crypto-forecast-core/0.1 (rust)")
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ExternalFetchError::Failed {
                source_id: "coingecko".into(),
                symbol: "*".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            vs_currency: vs_currency.into(),
            rate_limiter,
            max_retry_attempts,
        })
    }

    fn range_url(&self, instrument: Instrument, from_ts: i64, to_ts: i64) -> reqwest::Url {
        let base = format!(
            "https://pro-api.coingecko.com/api/v3/coins/{}/ohlc/range",
            coin_id(instrument)
        );
        reqwest::Url::parse_with_params(
            &base,
            &[
                ("vs_currency", self.vs_currency.clone()),
                ("from", from_ts.to_string()),
                ("to", to_ts.to_string()),
                ("interval", "daily".into()),
            ],
        )
        .expect("static base url with valid query params")
    }

    async fn get_json(&self, url: reqwest::Url, symbol: &str) -> Result<serde_json::Value, ExternalFetchError> {
        let mut attempt = 0usize;
        loop {
            self.rate_limiter.acquire().await;
            let resp = self.client.get(url.clone()).send().await.map_err(|e| ExternalFetchError::Failed {
                source_id: "coingecko".into(),
                symbol: symbol.into(),
                message: e.to_string(),
            })?;
            if resp.status().is_success() {
                return resp.json::<serde_json::Value>().await.map_err(|e| ExternalFetchError::Failed {
                    source_id: "coingecko".into(),
                    symbol: symbol.into(),
                    message: format!("parse error: {e}"),
                });
            }
            let status = resp.status();
            if !status.is_server_error() && status.as_u16() != 429 {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExternalFetchError::Failed {
                    source_id: "coingecko".into(),
                    symbol: symbol.into(),
                    message: format!("HTTP {status}: {body}"),
                });
            }
            attempt += 1;
            if attempt > self.max_retry_attempts {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExternalFetchError::Failed {
                    source_id: "coingecko".into(),
                    symbol: symbol.into(),
                    message: format!("HTTP {status} after {} retries: {body}", self.max_retry_attempts),
                });
            }
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let backoff_ms = retry_after.map(|s| s * 1000).unwrap_or(300 * attempt as u64);
            warn!(%status, backoff_ms, "coingecko request failed, retrying");
            sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

#[async_trait]
impl ExternalDataSource for CoinGeckoSource {
    async fn fetch_historical_data(
        &self,
        instrument: Instrument,
        range: TimeRange,
    ) -> Result<Vec<Ohlcv>, ExternalFetchError> {
        let symbol = instrument.code();
        let mut cur_from = range.from().timestamp();
        let to_ts = range.to().timestamp();
        let one_day = 86_400i64;
        let mut raws: Vec<(f64, f64, f64, f64, f64)> = Vec::new();

        while cur_from < to_ts {
            let cur_to = (cur_from + MAX_DAYS_PER_REQUEST * one_day).min(to_ts);
            let url = self.range_url(instrument, cur_from, cur_to);
            let val = self.get_json(url, symbol).await?;
            if let Some(arr) = val.as_array() {
                for row in arr {
                    if let Some(a) = row.as_array() {
                        if a.len() < 5 {
                            continue;
                        }
                        let ts_ms = a[0].as_f64().or_else(|| a[0].as_i64().map(|x| x as f64)).unwrap_or(0.0);
                        let o = a[1].as_f64().unwrap_or(0.0);
                        let h = a[2].as_f64().unwrap_or(0.0);
                        let l = a[3].as_f64().unwrap_or(0.0);
                        let c = a[4].as_f64().unwrap_or(0.0);
                        raws.push((ts_ms, o, h, l, c));
                    }
                }
            }
            cur_from = cur_to + 1;
        }

        raws.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let currency: &'static str = instrument.quote_currency();
        let mut out = Vec::new();
        for (_date, group) in &raws.into_iter().chunk_by(|r| {
            let ts = (r.0 / 1000.0) as i64;
            Utc.timestamp_opt(ts, 0).unwrap().date_naive()
        }) {
            if let Some(last) = group.last() {
                let ts = (last.0 / 1000.0) as i64;
                let timestamp = Utc.timestamp_opt(ts, 0).unwrap();
                let open = Decimal::try_from(last.1).unwrap_or_default();
                let high = Decimal::try_from(last.2).unwrap_or_default();
                let low = Decimal::try_from(last.3).unwrap_or_default();
                let close = Decimal::try_from(last.4).unwrap_or_default();
                let bar = Ohlcv {
                    open: Price::new(open, currency),
                    high: Price::new(high, currency),
                    low: Price::new(low, currency),
                    close: Price::new(close, currency),
                    volume: Decimal::ZERO,
                    timestamp,
                };
                if bar.validate().is_ok() {
                    out.push(bar);
                }
            }
        }
        info!(symbol, count = out.len(), "fetched historical bars");
        Ok(out)
    }

    async fn fetch_latest_data(&self, instrument: Instrument) -> Result<Ohlcv, ExternalFetchError> {
        let to = Utc::now();
        let from = to - chrono::Duration::days(2);
        let range = TimeRange::new(from, to);
        let mut bars = self.fetch_historical_data(instrument, range).await?;
        bars.pop().ok_or_else(|| ExternalFetchError::Failed {
            source_id: "coingecko".into(),
            symbol: instrument.code().into(),
            message: "no recent bar returned".into(),
        })
    }

    fn supports_symbol(&self, instrument: Instrument) -> bool {
        matches!(instrument, Instrument::Btc | Instrument::Eth)
    }

    fn data_source_id(&self) -> &str {
        "coingecko"
    }

    async fn healthy(&self) -> bool {
        let url = reqwest::Url::parse("https://pro-api.coingecko.com/api/v3/ping").unwrap();
        self.client.get(url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }
}
