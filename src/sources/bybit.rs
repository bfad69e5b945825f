// =============================================================================
// Bybit Source — Redundant price / volume / funding / open interest
// =============================================================================
//
// Second exchange feed so that a Binance outage does not blind the snapshot
// aggregator on the required fields. One call to the v5 linear tickers
// endpoint covers everything this provider supplies.

use anyhow::{Context, Result};
use tracing::debug;

use super::{get_json, value_as_f64, RawPayload};

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

/// Fetches the linear-perp ticker from Bybit v5.
pub struct BybitSource {
    client: reqwest::Client,
    base_url: String,
}

impl BybitSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch one reading for `symbol`.
    pub async fn fetch(&self, symbol: &str) -> Result<RawPayload> {
        let body = get_json(
            &self.client,
            &format!(
                "{}/v5/market/tickers?category=linear&symbol={symbol}",
                self.base_url
            ),
        )
        .await
        .with_context(|| format!("GET bybit tickers for {symbol}"))?;

        // v5 envelope: { retCode, retMsg, result: { list: [ {...} ] } }
        let ret_code = body["retCode"].as_i64().unwrap_or(-1);
        if ret_code != 0 {
            anyhow::bail!("bybit returned retCode {}: {}", ret_code, body["retMsg"]);
        }

        let entry = body["result"]["list"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("bybit tickers list is empty")?;

        let payload = RawPayload {
            price: value_as_f64(&entry["lastPrice"]),
            volume_24h: value_as_f64(&entry["turnover24h"]),
            funding_rate_pct: value_as_f64(&entry["fundingRate"]).map(|r| r * 100.0),
            open_interest: value_as_f64(&entry["openInterest"]),
            ..Default::default()
        };

        debug!(
            symbol,
            price = ?payload.price,
            oi = ?payload.open_interest,
            "bybit reading fetched"
        );

        Ok(payload)
    }
}
