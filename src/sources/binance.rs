// =============================================================================
// Binance Futures Source — Primary market data provider
// =============================================================================
//
// Pulls the widest field set of any provider from the Binance USDT-M futures
// REST API:
//
//   /fapi/v1/ticker/24hr                      price, 24h volume
//   /fapi/v1/premiumIndex                     funding rate
//   /fapi/v1/openInterest                     open interest
//   /futures/data/globalLongShortAccountRatio long/short positioning
//   /futures/data/takerlongshortRatio         taker buy/sell volume (5m bucket)
//
// The ticker is mandatory for a successful poll; the enrichment endpoints are
// best-effort and leave their fields unset on failure so one flaky endpoint
// does not blank out the whole reading.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{get_json, value_as_f64, RawPayload};

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Fetches price, volume, funding, open interest, positioning, and taker flow
/// from Binance futures.
pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceSource {
    /// Create a source that re-uses an existing HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch one full reading for `symbol`.
    pub async fn fetch(&self, symbol: &str) -> Result<RawPayload> {
        let mut payload = RawPayload::default();

        // Ticker is the anchor of the reading; without it the poll fails.
        let ticker = get_json(
            &self.client,
            &format!("{}/fapi/v1/ticker/24hr?symbol={symbol}", self.base_url),
        )
        .await
        .with_context(|| format!("GET 24h ticker for {symbol}"))?;

        payload.price = value_as_f64(&ticker["lastPrice"]);
        payload.volume_24h = value_as_f64(&ticker["quoteVolume"]);

        // Funding rate via the premium index endpoint. Binance reports the
        // rate as a decimal; we carry percent everywhere downstream.
        match get_json(
            &self.client,
            &format!("{}/fapi/v1/premiumIndex?symbol={symbol}", self.base_url),
        )
        .await
        {
            Ok(body) => {
                payload.funding_rate_pct =
                    value_as_f64(&body["lastFundingRate"]).map(|r| r * 100.0);
            }
            Err(e) => warn!(symbol, error = %e, "premium index fetch failed"),
        }

        match get_json(
            &self.client,
            &format!("{}/fapi/v1/openInterest?symbol={symbol}", self.base_url),
        )
        .await
        {
            Ok(body) => payload.open_interest = value_as_f64(&body["openInterest"]),
            Err(e) => warn!(symbol, error = %e, "open interest fetch failed"),
        }

        match get_json(
            &self.client,
            &format!(
                "{}/futures/data/globalLongShortAccountRatio?symbol={symbol}&period=5m&limit=1",
                self.base_url
            ),
        )
        .await
        {
            Ok(body) => {
                payload.long_short_ratio = body
                    .as_array()
                    .and_then(|arr| arr.first())
                    .and_then(|entry| value_as_f64(&entry["longShortRatio"]));
            }
            Err(e) => warn!(symbol, error = %e, "long/short ratio fetch failed"),
        }

        match get_json(
            &self.client,
            &format!(
                "{}/futures/data/takerlongshortRatio?symbol={symbol}&period=5m&limit=1",
                self.base_url
            ),
        )
        .await
        {
            Ok(body) => {
                if let Some(entry) = body.as_array().and_then(|arr| arr.first()) {
                    payload.taker_buy_volume = value_as_f64(&entry["buyVol"]);
                    payload.taker_sell_volume = value_as_f64(&entry["sellVol"]);
                }
            }
            Err(e) => warn!(symbol, error = %e, "taker flow fetch failed"),
        }

        debug!(
            symbol,
            price = ?payload.price,
            funding_pct = ?payload.funding_rate_pct,
            oi = ?payload.open_interest,
            "binance reading fetched"
        );

        Ok(payload)
    }
}
