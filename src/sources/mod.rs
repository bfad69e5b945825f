// =============================================================================
// Source Adapters — Multi-provider market data polling
// =============================================================================
//
// Each provider runs as an independent tokio poller on its own cadence and
// retry policy, so one provider outage cannot block the others. A poll NEVER
// propagates a transient network error: it degrades to a `stale` reading when
// a last-known-good payload exists, or a `failed` reading otherwise. The
// freshest reading per provider lands on a shared `ReadingBoard` that the
// pipeline cycle samples without blocking on slow adapters.

pub mod binance;
pub mod bybit;
pub mod coinglass;
pub mod sentiment;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine_config::ProviderConfig;
use crate::types::{FetchStatus, FieldKind, ProviderId};

pub use binance::BinanceSource;
pub use bybit::BybitSource;
pub use coinglass::CoinglassSource;
pub use sentiment::SentimentSource;

// ---------------------------------------------------------------------------
// Payload & reading
// ---------------------------------------------------------------------------

/// Raw field values fetched from one provider in one poll. Providers supply
/// overlapping or disjoint subsets, so every field is optional; the aggregator
/// asks "does this reading supply field X" instead of assuming a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayload {
    pub price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub taker_buy_volume: Option<f64>,
    pub taker_sell_volume: Option<f64>,
    /// Funding rate as a percentage (0.01 = 0.01%).
    pub funding_rate_pct: Option<f64>,
    pub open_interest: Option<f64>,
    pub long_short_ratio: Option<f64>,
    pub liquidation_long_notional: Option<f64>,
    pub liquidation_short_notional: Option<f64>,
    pub fear_greed_index: Option<f64>,
}

impl RawPayload {
    /// Value of a logical field, if this payload carries it.
    pub fn get(&self, field: FieldKind) -> Option<f64> {
        match field {
            FieldKind::Price => self.price,
            FieldKind::Volume24h => self.volume_24h,
            FieldKind::TakerBuyVolume => self.taker_buy_volume,
            FieldKind::TakerSellVolume => self.taker_sell_volume,
            FieldKind::FundingRate => self.funding_rate_pct,
            FieldKind::OpenInterest => self.open_interest,
            FieldKind::LongShortRatio => self.long_short_ratio,
            FieldKind::LiquidationLongNotional => self.liquidation_long_notional,
            FieldKind::LiquidationShortNotional => self.liquidation_short_notional,
            FieldKind::FearGreedIndex => self.fear_greed_index,
        }
    }

    pub fn supplies(&self, field: FieldKind) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        FieldKind::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// One provider's latest poll result. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct RawReading {
    pub provider: ProviderId,
    pub status: FetchStatus,
    /// When the payload data was actually obtained. For a `stale` reading
    /// this is the timestamp of the last successful fetch, so downstream
    /// freshness math needs no special casing.
    pub payload_at: DateTime<Utc>,
    /// When this poll attempt ran.
    pub polled_at: DateTime<Utc>,
    pub payload: RawPayload,
}

impl RawReading {
    /// Age of the underlying payload data at `now`, in seconds.
    pub fn payload_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.payload_at).num_seconds().max(0)
    }
}

// ---------------------------------------------------------------------------
// ReadingBoard — latest reading per provider
// ---------------------------------------------------------------------------

/// Shared board holding the most recent reading from each adapter. Written by
/// the pollers, sampled by the pipeline cycle.
#[derive(Default)]
pub struct ReadingBoard {
    readings: RwLock<HashMap<ProviderId, RawReading>>,
}

impl ReadingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, reading: RawReading) {
        self.readings.write().insert(reading.provider, reading);
    }

    pub fn latest(&self, provider: ProviderId) -> Option<RawReading> {
        self.readings.read().get(&provider).cloned()
    }

    /// Point-in-time copy of every provider's latest reading.
    pub fn sample(&self) -> HashMap<ProviderId, RawReading> {
        self.readings.read().clone()
    }

    pub fn provider_count(&self) -> usize {
        self.readings.read().len()
    }
}

// ---------------------------------------------------------------------------
// Provider fetchers
// ---------------------------------------------------------------------------

/// Enum dispatch over the concrete provider clients. Avoids trait objects for
/// the async fetch path; adding a provider is a new variant plus a module.
pub enum ProviderFetcher {
    Binance(BinanceSource),
    Bybit(BybitSource),
    Coinglass(CoinglassSource),
    Sentiment(SentimentSource),
}

impl ProviderFetcher {
    pub fn provider(&self) -> ProviderId {
        match self {
            Self::Binance(_) => ProviderId::Binance,
            Self::Bybit(_) => ProviderId::Bybit,
            Self::Coinglass(_) => ProviderId::Coinglass,
            Self::Sentiment(_) => ProviderId::Sentiment,
        }
    }

    /// One raw fetch against the provider. Errors here are transient and are
    /// absorbed by [`SourceAdapter::poll`].
    pub async fn fetch(&self, symbol: &str) -> Result<RawPayload> {
        match self {
            Self::Binance(s) => s.fetch(symbol).await,
            Self::Bybit(s) => s.fetch(symbol).await,
            Self::Coinglass(s) => s.fetch(symbol).await,
            Self::Sentiment(s) => s.fetch().await,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceAdapter — poll loop with fallback cache and capped backoff
// ---------------------------------------------------------------------------

/// Wraps a provider fetcher with the failure-isolation contract: timeout,
/// last-known-good cache, and exponential backoff capped at a ceiling.
pub struct SourceAdapter {
    fetcher: ProviderFetcher,
    config: ProviderConfig,
    last_good: Option<(RawPayload, DateTime<Utc>)>,
    consecutive_failures: u32,
}

impl SourceAdapter {
    pub fn new(fetcher: ProviderFetcher, config: ProviderConfig) -> Self {
        Self {
            fetcher,
            config,
            last_good: None,
            consecutive_failures: 0,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.fetcher.provider()
    }

    /// Run one poll. Never returns an error: a timeout or fetch failure
    /// produces a `stale` reading (cached payload attached) or a `failed`
    /// reading (no cache yet).
    pub async fn poll(&mut self, symbol: &str) -> RawReading {
        let provider = self.provider();
        let timeout = Duration::from_secs(self.config.poll_timeout_secs);

        let outcome = tokio::time::timeout(timeout, self.fetcher.fetch(symbol)).await;
        let polled_at = Utc::now();

        let fetch_result = match outcome {
            Ok(res) => res,
            Err(_) => Err(anyhow::anyhow!(
                "poll exceeded {}s timeout",
                self.config.poll_timeout_secs
            )),
        };

        match fetch_result {
            Ok(payload) if !payload.is_empty() => {
                self.consecutive_failures = 0;
                self.last_good = Some((payload.clone(), polled_at));
                debug!(provider = %provider, "poll ok");
                RawReading {
                    provider,
                    status: FetchStatus::Ok,
                    payload_at: polled_at,
                    polled_at,
                    payload,
                }
            }
            Ok(_) => {
                // Parsed fine but every field was missing; treat like a failure
                // so the cached payload keeps serving downstream.
                self.failed_reading(polled_at, "provider returned an empty payload")
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "poll failed");
                self.failed_reading(polled_at, &e.to_string())
            }
        }
    }

    fn failed_reading(&mut self, polled_at: DateTime<Utc>, reason: &str) -> RawReading {
        let provider = self.provider();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match &self.last_good {
            Some((payload, at)) => {
                let age = (polled_at - *at).num_seconds();
                debug!(
                    provider = %provider,
                    cached_age_secs = age,
                    reason,
                    "serving last-known-good payload"
                );
                RawReading {
                    provider,
                    status: FetchStatus::Stale,
                    payload_at: *at,
                    polled_at,
                    payload: payload.clone(),
                }
            }
            None => RawReading {
                provider,
                status: FetchStatus::Failed,
                payload_at: polled_at,
                polled_at,
                payload: RawPayload::default(),
            },
        }
    }

    /// Delay before the next poll: the configured interval on success,
    /// `interval * 2^failures` capped at the ceiling after failures.
    pub fn next_delay(&self) -> Duration {
        let base = self.config.poll_interval_secs;
        if self.consecutive_failures == 0 {
            return Duration::from_secs(base);
        }
        let shift = self.consecutive_failures.min(6);
        let backed_off = base.saturating_mul(1u64 << shift);
        Duration::from_secs(backed_off.min(self.config.max_backoff_secs))
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Poll `adapter` forever, publishing each reading onto `board`.
///
/// Runs as its own tokio task; the cycle loop never waits on it.
pub async fn run_poll_loop(mut adapter: SourceAdapter, symbol: String, board: std::sync::Arc<ReadingBoard>) {
    let provider = adapter.provider();
    tracing::info!(provider = %provider, symbol = %symbol, "source adapter started");
    loop {
        let reading = adapter.poll(&symbol).await;
        board.publish(reading);
        tokio::time::sleep(adapter.next_delay()).await;
    }
}

// ---------------------------------------------------------------------------
// Shared JSON helpers used by the concrete fetchers
// ---------------------------------------------------------------------------

/// GET `url` and parse the body as JSON, failing on non-2xx statuses.
pub(crate) async fn get_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .with_context(|| format!("failed to parse response body from {url}"))?;

    if !status.is_success() {
        anyhow::bail!("{url} returned {status}: {body}");
    }
    Ok(body)
}

/// Providers send numeric values as JSON strings as often as numbers.
pub(crate) fn value_as_f64(val: &serde_json::Value) -> Option<f64> {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            poll_interval_secs: 10,
            poll_timeout_secs: 1,
            max_backoff_secs: 120,
        }
    }

    fn unreachable_adapter() -> SourceAdapter {
        // Points at a reserved-for-documentation address; connect fails fast
        // and deterministically.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        SourceAdapter::new(
            ProviderFetcher::Sentiment(SentimentSource::with_base_url(
                client,
                "http://192.0.2.1:9".to_string(),
            )),
            test_config(),
        )
    }

    #[tokio::test]
    async fn failed_poll_without_cache_yields_failed_reading() {
        let mut adapter = unreachable_adapter();
        let reading = adapter.poll("BTCUSDT").await;
        assert_eq!(reading.status, FetchStatus::Failed);
        assert!(reading.payload.is_empty());
        assert_eq!(adapter.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn failed_poll_with_cache_yields_stale_reading() {
        let mut adapter = unreachable_adapter();
        let cached_at = Utc::now() - chrono::Duration::seconds(90);
        adapter.last_good = Some((
            RawPayload {
                fear_greed_index: Some(42.0),
                ..Default::default()
            },
            cached_at,
        ));

        let reading = adapter.poll("BTCUSDT").await;
        assert_eq!(reading.status, FetchStatus::Stale);
        assert_eq!(reading.payload.fear_greed_index, Some(42.0));
        assert_eq!(reading.payload_at, cached_at);
        assert!(reading.payload_age_secs(Utc::now()) >= 90);
    }

    #[tokio::test]
    async fn backoff_grows_and_caps() {
        let mut adapter = unreachable_adapter();
        assert_eq!(adapter.next_delay(), Duration::from_secs(10));

        adapter.poll("BTCUSDT").await;
        assert_eq!(adapter.next_delay(), Duration::from_secs(20));

        adapter.poll("BTCUSDT").await;
        assert_eq!(adapter.next_delay(), Duration::from_secs(40));

        for _ in 0..5 {
            adapter.poll("BTCUSDT").await;
        }
        // Capped at max_backoff_secs, not interval * 2^7.
        assert_eq!(adapter.next_delay(), Duration::from_secs(120));
    }

    #[test]
    fn board_keeps_latest_reading_per_provider() {
        let board = ReadingBoard::new();
        let now = Utc::now();

        let mk = |price: f64| RawReading {
            provider: ProviderId::Binance,
            status: FetchStatus::Ok,
            payload_at: now,
            polled_at: now,
            payload: RawPayload {
                price: Some(price),
                ..Default::default()
            },
        };

        board.publish(mk(100.0));
        board.publish(mk(101.0));

        assert_eq!(board.provider_count(), 1);
        let latest = board.latest(ProviderId::Binance).unwrap();
        assert_eq!(latest.payload.price, Some(101.0));
    }

    #[test]
    fn payload_field_lookup() {
        let payload = RawPayload {
            price: Some(50_000.0),
            funding_rate_pct: Some(0.01),
            ..Default::default()
        };
        assert!(payload.supplies(FieldKind::Price));
        assert!(!payload.supplies(FieldKind::OpenInterest));
        assert_eq!(payload.get(FieldKind::FundingRate), Some(0.01));
        assert!(!payload.is_empty());
        assert!(RawPayload::default().is_empty());
    }

    #[test]
    fn value_as_f64_handles_strings_and_numbers() {
        assert_eq!(value_as_f64(&serde_json::json!("37020.5")), Some(37020.5));
        assert_eq!(value_as_f64(&serde_json::json!(42)), Some(42.0));
        assert_eq!(value_as_f64(&serde_json::json!(null)), None);
    }
}
