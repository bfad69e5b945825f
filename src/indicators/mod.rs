// =============================================================================
// Indicator Engine — Derived values over the history ring
// =============================================================================
//
// Every indicator is a pure function of the window it reads; recomputing twice
// on the same ring state yields identical values. Each indicator has its own
// window and minimum-data policy: until the window holds enough usable
// snapshots the indicator is omitted, never zero-filled. Indicators that must
// not act on stale inputs read only fresh field samples; the slow-moving
// sentiment and liquidation feeds are allowed to carry forward.

pub mod cvd;
pub mod funding_trend;
pub mod liquidation;
pub mod long_short;
pub mod oi_divergence;
pub mod price_roc;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine_config::EngineConfig;
use crate::history::HistoryRing;
use crate::snapshot::MarketSnapshot;
use crate::types::{EventKind, FieldKind};

// ---------------------------------------------------------------------------
// Names & values
// ---------------------------------------------------------------------------

/// Named indicators produced each cycle. The snake_case serialisation is the
/// key used in the scoring weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorName {
    FundingTrend,
    OiPriceDivergence,
    Cvd,
    LiquidationDensity,
    LongShortRatio,
    Sentiment,
    PriceRoc,
}

impl IndicatorName {
    pub const ALL: [IndicatorName; 7] = [
        IndicatorName::FundingTrend,
        IndicatorName::OiPriceDivergence,
        IndicatorName::Cvd,
        IndicatorName::LiquidationDensity,
        IndicatorName::LongShortRatio,
        IndicatorName::Sentiment,
        IndicatorName::PriceRoc,
    ];

    /// The key used in the scoring weight table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FundingTrend => "funding_trend",
            Self::OiPriceDivergence => "oi_price_divergence",
            Self::Cvd => "cvd",
            Self::LiquidationDensity => "liquidation_density",
            Self::LongShortRatio => "long_short_ratio",
            Self::Sentiment => "sentiment",
            Self::PriceRoc => "price_roc",
        }
    }
}

impl std::fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One computed indicator value, attached to a snapshot timestamp. Superseded
/// values remain in the ring for trend math and are never edited in place.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorValue {
    pub name: IndicatorName,
    /// Primary numeric value. Meaning is indicator-specific: funding slope,
    /// divergence lean, net CVD, in-band liquidation notional, long/short
    /// ratio, sentiment index, price ROC percent.
    pub value: f64,
    /// Secondary value where one exists: latest funding rate percent, OI
    /// change percent, CVD pressure ratio, long liquidation share, ratio
    /// rate-of-change percent.
    pub aux: Option<f64>,
    /// Indicator-specific extreme flag (e.g. |funding| past the configured
    /// threshold, divergence present).
    pub extreme: bool,
    /// Human-readable descriptor of the window this value covers.
    pub window: String,
    pub at: DateTime<Utc>,
    /// Human-readable interpretation for the report layer.
    pub detail: String,
}

/// The current cycle's indicator values, keyed by name.
pub type IndicatorSet = HashMap<IndicatorName, IndicatorValue>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Recomputes the full indicator set from the ring. Stateless; all windows
/// and thresholds come from the config tables.
pub struct IndicatorEngine {
    config: EngineConfig,
}

impl IndicatorEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Recompute every indicator whose window holds enough data. Idempotent
    /// for a given ring state.
    pub fn recompute(&self, ring: &HistoryRing) -> IndicatorSet {
        let mut set = IndicatorSet::new();
        let Some(newest) = ring.latest_snapshot() else {
            return set;
        };
        let at = newest.at;
        let w = &self.config.windows;

        // ── Funding-rate trend ──────────────────────────────────────────
        {
            let series =
                fresh_series(&ring.recent_snapshots(w.funding_trend_points), FieldKind::FundingRate, at);
            let extreme_pct = self
                .config
                .rule_for(EventKind::FundingExtreme)
                .map(|r| r.threshold)
                .unwrap_or(0.05);
            if let Some(v) =
                funding_trend::compute(&series, w.funding_trend_points, extreme_pct, at)
            {
                set.insert(IndicatorName::FundingTrend, v);
            }
        }

        // ── Open-interest / price divergence ────────────────────────────
        {
            let snaps = ring.recent_snapshots(w.oi_window_points);
            if let Some(v) = oi_divergence::compute(&snaps, w.oi_window_points, at) {
                set.insert(IndicatorName::OiPriceDivergence, v);
            }
        }

        // ── Cumulative volume delta (window-relative) ───────────────────
        {
            let snaps = ring.snapshots_window(Duration::minutes(w.cvd_window_mins));
            if let Some(v) = cvd::compute(&snaps, w.cvd_window_mins, at) {
                set.insert(IndicatorName::Cvd, v);
            }
        }

        // ── Liquidation density near the current price ──────────────────
        {
            let snaps = ring.snapshots_window(Duration::minutes(w.liquidation_window_mins));
            if let Some(v) = liquidation::compute(
                &snaps,
                &newest,
                w.liquidation_band_pct,
                w.liquidation_window_mins,
                at,
            ) {
                set.insert(IndicatorName::LiquidationDensity, v);
            }
        }

        // ── Long/short ratio with rate of change ────────────────────────
        {
            let snaps = ring.recent_snapshots(w.long_short_points);
            if let Some(v) = long_short::compute(&snaps, at) {
                set.insert(IndicatorName::LongShortRatio, v);
            }
        }

        // ── Sentiment (slow feed — carry-forward allowed) ───────────────
        if let Some(fg) = newest.value(FieldKind::FearGreedIndex) {
            let detail = if fg <= 20.0 {
                format!("Extreme fear ({fg:.0}) - contrarian long lean")
            } else if fg >= 80.0 {
                format!("Extreme greed ({fg:.0}) - contrarian short lean")
            } else {
                format!("Fear & Greed {fg:.0} - no strong lean")
            };
            set.insert(
                IndicatorName::Sentiment,
                IndicatorValue {
                    name: IndicatorName::Sentiment,
                    value: fg,
                    aux: None,
                    extreme: fg <= 20.0 || fg >= 80.0,
                    window: "latest".to_string(),
                    at,
                    detail,
                },
            );
        }

        // ── Price rate of change ────────────────────────────────────────
        {
            let series =
                fresh_series(&ring.recent_snapshots(w.price_roc_points), FieldKind::Price, at);
            if let Some(v) = price_roc::compute(&series, w.price_roc_points, at) {
                set.insert(IndicatorName::PriceRoc, v);
            }
        }

        set
    }
}

/// Extract the fresh values of `field` from a snapshot slice, oldest first.
/// Returns an empty series when the NEWEST snapshot does not carry the field
/// fresh — an indicator that requires fresh input must sit out a cycle whose
/// latest reading is stale.
pub(crate) fn fresh_series(
    snapshots: &[MarketSnapshot],
    field: FieldKind,
    newest_at: DateTime<Utc>,
) -> Vec<f64> {
    let newest_ok = snapshots
        .last()
        .map_or(false, |s| s.at == newest_at && s.has_fresh(field));
    if !newest_ok {
        return Vec::new();
    }
    snapshots
        .iter()
        .filter_map(|s| s.fresh_value(field))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::snapshot::FieldSample;
    use crate::types::ProviderId;

    /// Build a snapshot with the given fresh field values.
    pub fn snapshot_with(at: DateTime<Utc>, values: &[(FieldKind, f64)]) -> MarketSnapshot {
        let mut fields = HashMap::new();
        for (field, value) in values {
            fields.insert(
                *field,
                FieldSample {
                    value: *value,
                    provider: ProviderId::Binance,
                    age_secs: 0,
                    fresh: true,
                },
            );
        }
        MarketSnapshot {
            at,
            fields,
            degraded: false,
            degraded_fields: Vec::new(),
        }
    }

    /// Mark every field of `snapshot` stale, as after a full adapter outage.
    pub fn mark_all_stale(snapshot: &mut MarketSnapshot) {
        for sample in snapshot.fields.values_mut() {
            sample.fresh = false;
            sample.age_secs = 3600;
        }
        snapshot.degraded = true;
    }
}
