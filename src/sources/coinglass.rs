// =============================================================================
// Coinglass Source — Liquidation long/short notional
// =============================================================================
//
// Aggregated liquidation data is not available from the exchanges' public
// REST APIs, so it comes from Coinglass. The API key (if any) is read from
// the COINGLASS_API_KEY environment variable at construction and sent as the
// `coinglassSecret` header; without a key the endpoint serves a rate-limited
// free tier.

use anyhow::{Context, Result};
use tracing::debug;

use super::{value_as_f64, RawPayload};

const DEFAULT_BASE_URL: &str = "https://open-api.coinglass.com";

/// Fetches 24h long/short liquidation notional for a coin.
pub struct CoinglassSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinglassSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: std::env::var("COINGLASS_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }

    pub fn with_base_url(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url,
            api_key: None,
        }
    }

    /// Fetch liquidation totals for the coin underlying `symbol`
    /// ("BTCUSDT" → "BTC").
    pub async fn fetch(&self, symbol: &str) -> Result<RawPayload> {
        let coin = symbol
            .strip_suffix("USDT")
            .or_else(|| symbol.strip_suffix("USD"))
            .unwrap_or(symbol);

        let url = format!(
            "{}/public/v2/liquidation_info?symbol={coin}&time_type=1",
            self.base_url
        );

        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("coinglassSecret", key);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("GET liquidation info for {coin}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse liquidation response body")?;

        if !status.is_success() {
            anyhow::bail!("liquidation API returned {}: {}", status, body);
        }
        if body["success"].as_bool() == Some(false) {
            anyhow::bail!("liquidation API rejected request: {}", body["msg"]);
        }

        let data = &body["data"];
        let payload = RawPayload {
            liquidation_long_notional: value_as_f64(&data["longVolUsd"]),
            liquidation_short_notional: value_as_f64(&data["shortVolUsd"]),
            ..Default::default()
        };

        debug!(
            coin,
            long_usd = ?payload.liquidation_long_notional,
            short_usd = ?payload.liquidation_short_notional,
            "liquidation reading fetched"
        );

        Ok(payload)
    }
}
