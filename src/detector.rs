// =============================================================================
// Anomaly Detector — Rule table evaluation with per-kind cooldowns
// =============================================================================
//
// Runs after indicator recomputation each cycle. Every enabled rule is
// evaluated in isolation: a rule whose inputs are missing (stale field, cold
// indicator window) simply skips this cycle without affecting the others.
// Emitted events are deduplicated per kind by a cooldown clock, so a condition
// persisting across cycles produces one event per cooldown period rather than
// one per cycle. Severity scales with how far the measurement exceeds the
// threshold (1x / 2x / 3x).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine_config::EngineConfig;
use crate::history::HistoryRing;
use crate::indicators::{IndicatorName, IndicatorSet};
use crate::snapshot::MarketSnapshot;
use crate::types::{EventKind, FieldKind, Severity};

/// One emitted anomaly event. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub severity: Severity,
    /// The measured value that tripped the rule.
    pub value: f64,
    /// The rule threshold it was measured against.
    pub threshold: f64,
    pub at: DateTime<Utc>,
    /// The indicator the rule read, when it read one; snapshot-driven rules
    /// (volume surge, sentiment) carry `None`.
    pub source_indicator: Option<IndicatorName>,
    pub reason: String,
}

/// Stateful detector; owns the per-kind cooldown clocks.
pub struct AnomalyDetector {
    last_emitted: HashMap<EventKind, DateTime<Utc>>,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self {
            last_emitted: HashMap::new(),
        }
    }

    /// Evaluate every enabled rule against the current cycle. Returns the
    /// events emitted this cycle (cooldown-filtered).
    pub fn detect(
        &mut self,
        ring: &HistoryRing,
        indicators: &IndicatorSet,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some(snapshot) = ring.latest_snapshot() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for kind in EventKind::ALL {
            let Some(rule) = config.rule_for(kind) else {
                continue;
            };
            if !self.cooldown_elapsed(kind, rule.cooldown_secs, now) {
                continue;
            }

            let trigger = match kind {
                EventKind::PriceShock => check_price_shock(indicators, rule.threshold),
                EventKind::VolumeSurge => {
                    check_volume_surge(ring, &snapshot, rule.threshold, config)
                }
                EventKind::FundingExtreme => check_funding_extreme(indicators, rule.threshold),
                EventKind::LiquidationCluster => {
                    check_liquidation_cluster(ring, indicators, rule.threshold, config, now)
                }
                EventKind::LongShortExtreme => {
                    check_long_short_extreme(indicators, rule.threshold)
                }
                EventKind::SentimentExtreme => {
                    check_sentiment_extreme(&snapshot, rule.threshold)
                }
            };

            if let Some((value, excess_ratio, reason)) = trigger {
                let source_indicator = match kind {
                    EventKind::PriceShock => Some(IndicatorName::PriceRoc),
                    EventKind::FundingExtreme => Some(IndicatorName::FundingTrend),
                    EventKind::LiquidationCluster => Some(IndicatorName::LiquidationDensity),
                    EventKind::LongShortExtreme => Some(IndicatorName::LongShortRatio),
                    EventKind::VolumeSurge | EventKind::SentimentExtreme => None,
                };
                let event = Event {
                    id: Uuid::new_v4(),
                    kind,
                    severity: Severity::from_excess_ratio(excess_ratio),
                    value,
                    threshold: rule.threshold,
                    at: now,
                    source_indicator,
                    reason,
                };
                info!(
                    kind = %event.kind,
                    severity = %event.severity,
                    value = event.value,
                    threshold = event.threshold,
                    "anomaly detected"
                );
                self.last_emitted.insert(kind, now);
                events.push(event);
            }
        }
        events
    }

    fn cooldown_elapsed(&self, kind: EventKind, cooldown_secs: u64, now: DateTime<Utc>) -> bool {
        self.last_emitted.get(&kind).map_or(true, |last| {
            now - *last >= Duration::seconds(cooldown_secs as i64)
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Rule checks — each returns (measured value, threshold-excess ratio, reason)
// ---------------------------------------------------------------------------

fn check_price_shock(
    indicators: &IndicatorSet,
    threshold_pct: f64,
) -> Option<(f64, f64, String)> {
    let roc = indicators.get(&IndicatorName::PriceRoc)?;
    let move_pct = roc.value.abs();
    if move_pct < threshold_pct {
        return None;
    }
    let direction = if roc.value > 0.0 { "up" } else { "down" };
    Some((
        roc.value,
        move_pct / threshold_pct,
        format!("Price moved {:.2}% {direction} within the lookback window", roc.value),
    ))
}

fn check_volume_surge(
    ring: &HistoryRing,
    snapshot: &MarketSnapshot,
    threshold_multiple: f64,
    config: &EngineConfig,
) -> Option<(f64, f64, String)> {
    let buy = snapshot.fresh_value(FieldKind::TakerBuyVolume)?;
    let sell = snapshot.fresh_value(FieldKind::TakerSellVolume)?;
    let latest = buy + sell;

    // Trailing average over the same wall-clock window the CVD indicator
    // reads, excluding the latest snapshot so a surge does not inflate its
    // own baseline.
    let lookback = ring.snapshots_window(Duration::minutes(config.windows.cvd_window_mins));
    let mut total = 0.0;
    let mut count = 0usize;
    for snap in lookback.iter().filter(|s| s.at != snapshot.at) {
        let (Some(b), Some(s)) = (
            snap.fresh_value(FieldKind::TakerBuyVolume),
            snap.fresh_value(FieldKind::TakerSellVolume),
        ) else {
            continue;
        };
        total += b + s;
        count += 1;
    }
    if count < 3 {
        return None;
    }
    let average = total / count as f64;
    if average <= 0.0 {
        return None;
    }

    let multiple = latest / average;
    if multiple < threshold_multiple {
        return None;
    }
    Some((
        multiple,
        multiple / threshold_multiple,
        format!("Taker volume {multiple:.1}x the trailing average ({average:.0})"),
    ))
}

fn check_funding_extreme(
    indicators: &IndicatorSet,
    threshold_pct: f64,
) -> Option<(f64, f64, String)> {
    let funding = indicators.get(&IndicatorName::FundingTrend)?;
    let rate = funding.aux?;
    if rate.abs() < threshold_pct {
        return None;
    }
    let side = if rate > 0.0 { "longs" } else { "shorts" };
    Some((
        rate,
        rate.abs() / threshold_pct,
        format!("Funding rate {rate:.4}% - {side} paying heavily to hold"),
    ))
}

fn check_liquidation_cluster(
    ring: &HistoryRing,
    indicators: &IndicatorSet,
    threshold_multiple: f64,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Option<(f64, f64, String)> {
    let density = indicators.get(&IndicatorName::LiquidationDensity)?;
    if density.value <= 0.0 {
        return None;
    }

    // Baseline: the trailing history of this same indicator, excluding the
    // value computed this cycle.
    let window = Duration::minutes(config.windows.liquidation_window_mins * 4);
    let history: Vec<f64> = ring
        .indicator_window(IndicatorName::LiquidationDensity, window, now)
        .iter()
        .filter(|v| v.at != density.at)
        .map(|v| v.value)
        .collect();
    if history.len() < 3 {
        return None;
    }
    let average = history.iter().sum::<f64>() / history.len() as f64;
    if average <= 0.0 {
        return None;
    }

    let multiple = density.value / average;
    if multiple < threshold_multiple {
        return None;
    }
    let long_share = density.aux.unwrap_or(0.5);
    Some((
        density.value,
        multiple / threshold_multiple,
        format!(
            "${:.0} liquidated near price ({multiple:.1}x trailing average, {:.0}% longs)",
            density.value,
            long_share * 100.0
        ),
    ))
}

fn check_long_short_extreme(
    indicators: &IndicatorSet,
    threshold_ratio: f64,
) -> Option<(f64, f64, String)> {
    let ls = indicators.get(&IndicatorName::LongShortRatio)?;
    let ratio = ls.value;
    if ratio <= 0.0 {
        return None;
    }

    // Evaluated symmetrically: 2.33 longs-per-short is as extreme as its
    // inverse.
    let (excess, side) = if ratio >= threshold_ratio {
        (ratio / threshold_ratio, "long")
    } else if ratio <= 1.0 / threshold_ratio {
        ((1.0 / ratio) / threshold_ratio, "short")
    } else {
        return None;
    };
    Some((
        ratio,
        excess,
        format!("Long/short ratio {ratio:.2} - accounts crowded {side}"),
    ))
}

fn check_sentiment_extreme(
    snapshot: &MarketSnapshot,
    threshold_distance: f64,
) -> Option<(f64, f64, String)> {
    // Slow feed; carry-forward values are acceptable here.
    let fg = snapshot.value(FieldKind::FearGreedIndex)?;
    let distance = (fg - 50.0).abs();
    if distance < threshold_distance {
        return None;
    }
    let label = if fg < 50.0 { "extreme fear" } else { "extreme greed" };
    Some((
        fg,
        distance / threshold_distance,
        format!("Fear & Greed index {fg:.0} - {label}"),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::snapshot_with;
    use crate::indicators::IndicatorValue;

    fn indicator(name: IndicatorName, value: f64, aux: Option<f64>, at: DateTime<Utc>) -> IndicatorValue {
        IndicatorValue {
            name,
            value,
            aux,
            extreme: false,
            window: "test".to_string(),
            at,
            detail: String::new(),
        }
    }

    fn base_ring(at: DateTime<Utc>) -> HistoryRing {
        let ring = HistoryRing::new(100, 86_400);
        ring.append_snapshot(snapshot_with(at, &[(FieldKind::Price, 50_000.0)]));
        ring
    }

    #[test]
    fn price_shock_fires_above_threshold_with_severity() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);
        let mut detector = AnomalyDetector::new();

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::PriceRoc,
            indicator(IndicatorName::PriceRoc, -4.5, None, now),
        );

        let events = detector.detect(&ring, &set, &cfg, now);
        let shock = events.iter().find(|e| e.kind == EventKind::PriceShock).unwrap();
        // 4.5% against a 2% threshold is a 2.25x excess.
        assert_eq!(shock.severity, Severity::High);
        assert_eq!(shock.value, -4.5);
    }

    #[test]
    fn cooldown_suppresses_repeat_events() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);
        let mut detector = AnomalyDetector::new();

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::PriceRoc,
            indicator(IndicatorName::PriceRoc, 3.0, None, now),
        );

        let first = detector.detect(&ring, &set, &cfg, now);
        assert_eq!(first.len(), 1);

        // Same condition 60s later: inside the 900s cooldown.
        let second = detector.detect(&ring, &set, &cfg, now + Duration::seconds(60));
        assert!(second.is_empty());

        // After the cooldown the kind can fire again.
        let third = detector.detect(&ring, &set, &cfg, now + Duration::seconds(901));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn cooldowns_are_tracked_per_kind() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);
        let mut detector = AnomalyDetector::new();

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::PriceRoc,
            indicator(IndicatorName::PriceRoc, 3.0, None, now),
        );
        let first = detector.detect(&ring, &set, &cfg, now);
        assert_eq!(first.len(), 1);

        // A different kind fires while price-shock is cooling down.
        set.insert(
            IndicatorName::FundingTrend,
            indicator(IndicatorName::FundingTrend, 0.001, Some(0.12), now),
        );
        let second = detector.detect(&ring, &set, &cfg, now + Duration::seconds(60));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, EventKind::FundingExtreme);
    }

    #[test]
    fn funding_extreme_fires_on_magnitude_either_sign() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::FundingTrend,
            indicator(IndicatorName::FundingTrend, -0.001, Some(-0.06), now),
        );
        let events = AnomalyDetector::new().detect(&ring, &set, &cfg, now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FundingExtreme);
        assert_eq!(events[0].value, -0.06);
    }

    #[test]
    fn long_short_extreme_is_symmetric() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::LongShortRatio,
            indicator(IndicatorName::LongShortRatio, 0.40, None, now),
        );
        let events = AnomalyDetector::new().detect(&ring, &set, &cfg, now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::LongShortExtreme);
    }

    #[test]
    fn sentiment_extreme_reads_carry_forward_snapshot() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = HistoryRing::new(100, 86_400);
        ring.append_snapshot(snapshot_with(
            now,
            &[(FieldKind::Price, 50_000.0), (FieldKind::FearGreedIndex, 12.0)],
        ));

        let events = AnomalyDetector::new().detect(&ring, &IndicatorSet::new(), &cfg, now);
        let sentiment = events
            .iter()
            .find(|e| e.kind == EventKind::SentimentExtreme)
            .unwrap();
        assert_eq!(sentiment.value, 12.0);
        // Distance 38 against threshold 30 is a 1.27x excess.
        assert_eq!(sentiment.severity, Severity::Medium);
    }

    #[test]
    fn volume_surge_compares_against_trailing_average() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = HistoryRing::new(100, 86_400);
        // Quiet baseline of 1000 per snapshot.
        for i in 0..5 {
            ring.append_snapshot(snapshot_with(
                now - Duration::minutes(5 - i),
                &[
                    (FieldKind::TakerBuyVolume, 600.0),
                    (FieldKind::TakerSellVolume, 400.0),
                ],
            ));
        }
        // Latest snapshot at 4x the baseline.
        ring.append_snapshot(snapshot_with(
            now,
            &[
                (FieldKind::TakerBuyVolume, 2_500.0),
                (FieldKind::TakerSellVolume, 1_500.0),
            ],
        ));

        let events = AnomalyDetector::new().detect(&ring, &IndicatorSet::new(), &cfg, now);
        let surge = events.iter().find(|e| e.kind == EventKind::VolumeSurge).unwrap();
        assert!((surge.value - 4.0).abs() < 1e-9);
        assert_eq!(surge.severity, Severity::Medium);
    }

    #[test]
    fn volume_surge_baseline_is_wall_clock_windowed() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = HistoryRing::new(100, 86_400);

        // Snapshots arrive every 10 minutes, so the 30m baseline holds far
        // fewer entries than 30 snapshots. A burst older than the window must
        // not inflate the trailing average.
        ring.append_snapshot(snapshot_with(
            now - Duration::minutes(40),
            &[
                (FieldKind::TakerBuyVolume, 50_000.0),
                (FieldKind::TakerSellVolume, 50_000.0),
            ],
        ));
        for i in 1..=3 {
            ring.append_snapshot(snapshot_with(
                now - Duration::minutes(40 - i * 10),
                &[
                    (FieldKind::TakerBuyVolume, 600.0),
                    (FieldKind::TakerSellVolume, 400.0),
                ],
            ));
        }
        ring.append_snapshot(snapshot_with(
            now,
            &[
                (FieldKind::TakerBuyVolume, 2_500.0),
                (FieldKind::TakerSellVolume, 1_500.0),
            ],
        ));

        let events = AnomalyDetector::new().detect(&ring, &IndicatorSet::new(), &cfg, now);
        let surge = events.iter().find(|e| e.kind == EventKind::VolumeSurge).unwrap();
        // Baseline is the three in-window quiet snapshots, not the old burst.
        assert!((surge.value - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rules_with_missing_inputs_skip_silently() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let ring = base_ring(now);

        // No indicators, no volume fields, no sentiment: nothing can fire,
        // nothing panics.
        let events = AnomalyDetector::new().detect(&ring, &IndicatorSet::new(), &cfg, now);
        assert!(events.is_empty());
    }

    #[test]
    fn disabled_rule_never_fires() {
        let mut cfg = EngineConfig::default();
        for rule in &mut cfg.anomaly_rules {
            if rule.kind == EventKind::PriceShock {
                rule.enabled = false;
            }
        }
        let now = Utc::now();
        let ring = base_ring(now);

        let mut set = IndicatorSet::new();
        set.insert(
            IndicatorName::PriceRoc,
            indicator(IndicatorName::PriceRoc, 9.0, None, now),
        );
        let events = AnomalyDetector::new().detect(&ring, &set, &cfg, now);
        assert!(events.is_empty());
    }
}
