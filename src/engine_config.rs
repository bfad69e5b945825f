// =============================================================================
// Engine Configuration — Startup-time settings
// =============================================================================
//
// Every tunable parameter of the pipeline lives here: per-provider polling
// cadences and timeouts, snapshot freshness rules, indicator windows, the
// anomaly rule table, and the scoring weight table. Thresholds and weights are
// explicit data tables rather than scattered conditionals, so a new rule is a
// table addition, not a code change.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file. The config is read once at startup and never
// hot-reloaded mid-cycle.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{EventKind, FieldKind, ProviderId};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_cycle_interval_secs() -> u64 {
    60
}

fn default_freshness_ceiling_secs() -> u64 {
    180
}

fn default_required_fields() -> Vec<FieldKind> {
    vec![FieldKind::Price, FieldKind::Volume24h]
}

fn default_provider_priority() -> Vec<ProviderId> {
    ProviderId::ALL.to_vec()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_max_ring_entries() -> usize {
    1000
}

fn default_max_ring_age_secs() -> u64 {
    86_400
}

// =============================================================================
// ProviderConfig
// =============================================================================

/// Polling parameters for one source adapter. Each adapter runs on its own
/// cadence and backoff so one provider outage cannot block the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether this adapter is spawned at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between successful polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-poll timeout; an in-flight poll exceeding it is abandoned and
    /// recorded as a failed reading.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Ceiling for the exponential retry backoff after consecutive failures.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl ProviderConfig {
    fn with_interval(poll_interval_secs: u64) -> Self {
        Self {
            poll_interval_secs,
            ..Self::default()
        }
    }
}

// =============================================================================
// Indicator windows
// =============================================================================

fn default_funding_trend_points() -> usize {
    8
}

fn default_oi_window_points() -> usize {
    8
}

fn default_cvd_window_mins() -> i64 {
    30
}

fn default_liquidation_window_mins() -> i64 {
    60
}

fn default_liquidation_band_pct() -> f64 {
    1.5
}

fn default_long_short_points() -> usize {
    6
}

fn default_price_roc_points() -> usize {
    5
}

/// Per-indicator window sizes. Count-based windows are in snapshots; duration
/// windows are wall-clock minutes over the history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorWindows {
    #[serde(default = "default_funding_trend_points")]
    pub funding_trend_points: usize,

    #[serde(default = "default_oi_window_points")]
    pub oi_window_points: usize,

    #[serde(default = "default_cvd_window_mins")]
    pub cvd_window_mins: i64,

    #[serde(default = "default_liquidation_window_mins")]
    pub liquidation_window_mins: i64,

    /// Half-width of the price band for liquidation clustering, as a percent
    /// of the current price.
    #[serde(default = "default_liquidation_band_pct")]
    pub liquidation_band_pct: f64,

    #[serde(default = "default_long_short_points")]
    pub long_short_points: usize,

    /// Lookback in snapshots for the price rate-of-change indicator.
    #[serde(default = "default_price_roc_points")]
    pub price_roc_points: usize,
}

impl Default for IndicatorWindows {
    fn default() -> Self {
        Self {
            funding_trend_points: default_funding_trend_points(),
            oi_window_points: default_oi_window_points(),
            cvd_window_mins: default_cvd_window_mins(),
            liquidation_window_mins: default_liquidation_window_mins(),
            liquidation_band_pct: default_liquidation_band_pct(),
            long_short_points: default_long_short_points(),
            price_roc_points: default_price_roc_points(),
        }
    }
}

// =============================================================================
// Anomaly rule table
// =============================================================================

/// One row of the anomaly rule table.
///
/// The meaning of `threshold` is rule-specific:
///   price-shock          — absolute move percent within the lookback window
///   volume-surge         — multiple of the trailing average volume
///   funding-extreme      — absolute funding rate percent
///   liquidation-cluster  — multiple of the trailing average in-band notional
///   long-short-extreme   — long/short ratio bound (evaluated both sides)
///   sentiment-extreme    — distance of the Fear & Greed index from 50
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRule {
    pub kind: EventKind,
    pub threshold: f64,
    pub cooldown_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_anomaly_rules() -> Vec<AnomalyRule> {
    vec![
        AnomalyRule {
            kind: EventKind::PriceShock,
            threshold: 2.0,
            cooldown_secs: 900,
            enabled: true,
        },
        AnomalyRule {
            kind: EventKind::VolumeSurge,
            threshold: 3.0,
            cooldown_secs: 900,
            enabled: true,
        },
        AnomalyRule {
            kind: EventKind::FundingExtreme,
            threshold: 0.05,
            cooldown_secs: 1800,
            enabled: true,
        },
        AnomalyRule {
            kind: EventKind::LiquidationCluster,
            threshold: 2.0,
            cooldown_secs: 600,
            enabled: true,
        },
        AnomalyRule {
            kind: EventKind::LongShortExtreme,
            threshold: 2.33,
            cooldown_secs: 1800,
            enabled: true,
        },
        AnomalyRule {
            kind: EventKind::SentimentExtreme,
            threshold: 30.0,
            cooldown_secs: 3600,
            enabled: true,
        },
    ]
}

// =============================================================================
// Scoring weight table
// =============================================================================

/// One row of the scoring weight table. An indicator may contribute to only
/// one side (weight 0.0 on the other). Weights per side sum to 100 with the
/// defaults, and the final scores are clamped to [0, 100] regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeight {
    pub indicator: String,
    pub long_weight: f64,
    pub short_weight: f64,
}

fn default_score_weights() -> Vec<ScoreWeight> {
    vec![
        ScoreWeight {
            indicator: "funding_trend".to_string(),
            long_weight: 20.0,
            short_weight: 20.0,
        },
        ScoreWeight {
            indicator: "oi_price_divergence".to_string(),
            long_weight: 15.0,
            short_weight: 15.0,
        },
        ScoreWeight {
            indicator: "cvd".to_string(),
            long_weight: 15.0,
            short_weight: 15.0,
        },
        ScoreWeight {
            indicator: "liquidation_density".to_string(),
            long_weight: 10.0,
            short_weight: 10.0,
        },
        ScoreWeight {
            indicator: "long_short_ratio".to_string(),
            long_weight: 20.0,
            short_weight: 20.0,
        },
        ScoreWeight {
            indicator: "sentiment".to_string(),
            long_weight: 10.0,
            short_weight: 10.0,
        },
        // Rapid price moves are scored CONTRARIAN: a sharp pump contributes to
        // the short side and a sharp dump to the long side.
        ScoreWeight {
            indicator: "price_roc".to_string(),
            long_weight: 10.0,
            short_weight: 10.0,
        },
    ]
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Futures Sentinel engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Futures symbol the engine observes.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Pipeline cycle cadence in seconds.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// A required field older than this is marked degraded.
    #[serde(default = "default_freshness_ceiling_secs")]
    pub freshness_ceiling_secs: u64,

    /// Fields that must all be fresh for a snapshot to count as non-degraded.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<FieldKind>,

    /// Tie-break order when two providers supply the same field at equal
    /// freshness. Earlier wins.
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<ProviderId>,

    // --- Per-provider polling ------------------------------------------------
    #[serde(default)]
    pub binance: ProviderConfig,

    #[serde(default)]
    pub bybit: ProviderConfig,

    #[serde(default = "default_coinglass_config")]
    pub coinglass: ProviderConfig,

    #[serde(default = "default_sentiment_config")]
    pub sentiment: ProviderConfig,

    // --- History ring bounds -------------------------------------------------
    #[serde(default = "default_max_ring_entries")]
    pub max_ring_entries: usize,

    #[serde(default = "default_max_ring_age_secs")]
    pub max_ring_age_secs: u64,

    // --- Derivation tables ---------------------------------------------------
    #[serde(default)]
    pub windows: IndicatorWindows,

    #[serde(default = "default_anomaly_rules")]
    pub anomaly_rules: Vec<AnomalyRule>,

    #[serde(default = "default_score_weights")]
    pub score_weights: Vec<ScoreWeight>,
}

fn default_coinglass_config() -> ProviderConfig {
    ProviderConfig::with_interval(120)
}

fn default_sentiment_config() -> ProviderConfig {
    ProviderConfig::with_interval(600)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            cycle_interval_secs: default_cycle_interval_secs(),
            freshness_ceiling_secs: default_freshness_ceiling_secs(),
            required_fields: default_required_fields(),
            provider_priority: default_provider_priority(),
            binance: ProviderConfig::default(),
            bybit: ProviderConfig::default(),
            coinglass: default_coinglass_config(),
            sentiment: default_sentiment_config(),
            max_ring_entries: default_max_ring_entries(),
            max_ring_age_secs: default_max_ring_age_secs(),
            windows: IndicatorWindows::default(),
            anomaly_rules: default_anomaly_rules(),
            score_weights: default_score_weights(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            cycle_interval_secs = config.cycle_interval_secs,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Validate startup invariants. A config with no enabled adapter or no
    /// required fields can never produce a meaningful snapshot, so this is a
    /// fatal error surfaced to the caller rather than a degraded cycle.
    pub fn validate(&self) -> Result<()> {
        let any_enabled = self.binance.enabled
            || self.bybit.enabled
            || self.coinglass.enabled
            || self.sentiment.enabled;
        if !any_enabled {
            anyhow::bail!("no source adapters enabled — nothing to observe");
        }
        if self.required_fields.is_empty() {
            anyhow::bail!("required_fields is empty — snapshot quorum is undefined");
        }
        if self.cycle_interval_secs == 0 {
            anyhow::bail!("cycle_interval_secs must be positive");
        }
        Ok(())
    }

    /// Look up the rule row for an event kind, if present and enabled.
    pub fn rule_for(&self, kind: EventKind) -> Option<&AnomalyRule> {
        self.anomaly_rules
            .iter()
            .find(|r| r.kind == kind && r.enabled)
    }

    /// Look up the weight row for an indicator name.
    pub fn weight_for(&self, indicator: &str) -> Option<&ScoreWeight> {
        self.score_weights.iter().find(|w| w.indicator == indicator)
    }

    /// Timeout for the shared HTTP client: the largest per-poll timeout among
    /// enabled adapters, so the client never cuts a slower provider short.
    /// The per-adapter poll timeout still enforces the lower bounds.
    pub fn http_timeout_secs(&self) -> u64 {
        [&self.binance, &self.bybit, &self.coinglass, &self.sentiment]
            .into_iter()
            .filter(|p| p.enabled)
            .map(|p| p.poll_timeout_secs)
            .max()
            .unwrap_or(default_poll_timeout_secs())
    }

    /// Position of `provider` in the priority order; unknown providers sort
    /// last.
    pub fn provider_rank(&self, provider: ProviderId) -> usize {
        self.provider_priority
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(usize::MAX)
    }
}
