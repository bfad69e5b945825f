// =============================================================================
// Sentiment Source — Fear & Greed index
// =============================================================================
//
// The alternative.me Fear & Greed index (0 = extreme fear, 100 = extreme
// greed). Slow-moving, polled on a long cadence; the only provider that is
// not keyed by symbol.

use anyhow::{Context, Result};
use tracing::debug;

use super::{get_json, value_as_f64, RawPayload};

const DEFAULT_BASE_URL: &str = "https://api.alternative.me";

/// Fetches the current Fear & Greed index reading.
pub struct SentimentSource {
    client: reqwest::Client,
    base_url: String,
}

impl SentimentSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn fetch(&self) -> Result<RawPayload> {
        let body = get_json(&self.client, &format!("{}/fng/", self.base_url))
            .await
            .context("GET fear & greed index")?;

        let value = body["data"]
            .as_array()
            .and_then(|arr| arr.first())
            .map(|entry| &entry["value"])
            .and_then(value_as_f64)
            .context("fear & greed response missing data[0].value")?;

        debug!(fear_greed = value, "sentiment reading fetched");

        Ok(RawPayload {
            fear_greed_index: Some(value),
            ..Default::default()
        })
    }
}
