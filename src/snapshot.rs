// =============================================================================
// Snapshot Aggregator — One point-in-time view across all providers
// =============================================================================
//
// Folds each adapter's latest reading into a single `MarketSnapshot` at the
// cycle boundary. Per field: pick the freshest reading among providers that
// supply it, breaking equal-freshness ties by the configured priority order.
// A required field older than the freshness ceiling (or missing entirely)
// marks the field AND the snapshot degraded — the snapshot is still emitted,
// never dropped, because downstream stages need continuity to apply their own
// conservative fallbacks.
//
// `assemble` is deterministic for a given reading set and `now`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine_config::EngineConfig;
use crate::sources::RawReading;
use crate::types::{FieldKind, ProviderId};

/// One resolved field inside a snapshot: the winning value, where it came
/// from, and how stale it was at assembly time.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSample {
    pub value: f64,
    pub provider: ProviderId,
    pub age_secs: i64,
    /// False when the contributing reading exceeded the freshness ceiling.
    pub fresh: bool,
}

/// A single logical point-in-time view of the market. Immutable once
/// assembled; appended to the history ring.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub at: DateTime<Utc>,
    pub fields: HashMap<FieldKind, FieldSample>,
    /// True when the required-field quorum was not met with fresh data.
    pub degraded: bool,
    /// Required fields that were stale or missing.
    pub degraded_fields: Vec<FieldKind>,
}

impl MarketSnapshot {
    /// Field value regardless of freshness (carry-forward fallback).
    pub fn value(&self, field: FieldKind) -> Option<f64> {
        self.fields.get(&field).map(|s| s.value)
    }

    /// Field value only if it was fresh at assembly time. Indicators that
    /// must not act on stale data use this accessor.
    pub fn fresh_value(&self, field: FieldKind) -> Option<f64> {
        self.fields
            .get(&field)
            .filter(|s| s.fresh)
            .map(|s| s.value)
    }

    pub fn has_fresh(&self, field: FieldKind) -> bool {
        self.fields.get(&field).map_or(false, |s| s.fresh)
    }
}

/// Merge the latest reading from each adapter into one snapshot at `now`.
///
/// Never returns `None`-like output: with zero usable readings the snapshot
/// simply carries no fields and is fully degraded.
pub fn assemble(
    readings: &HashMap<ProviderId, RawReading>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> MarketSnapshot {
    let ceiling = config.freshness_ceiling_secs as i64;
    let mut fields = HashMap::new();

    for field in FieldKind::ALL {
        // Candidates: every reading that actually carries this field. Failed
        // readings carry an empty payload and drop out naturally.
        let mut best: Option<(&RawReading, f64)> = None;

        for reading in readings.values() {
            let Some(value) = reading.payload.get(field) else {
                continue;
            };
            best = match best {
                None => Some((reading, value)),
                Some((current, _)) => {
                    let newer = reading.payload_at > current.payload_at;
                    let tied = reading.payload_at == current.payload_at
                        && config.provider_rank(reading.provider)
                            < config.provider_rank(current.provider);
                    if newer || tied {
                        Some((reading, value))
                    } else {
                        best
                    }
                }
            };
        }

        if let Some((reading, value)) = best {
            let age_secs = reading.payload_age_secs(now);
            fields.insert(
                field,
                FieldSample {
                    value,
                    provider: reading.provider,
                    age_secs,
                    fresh: age_secs <= ceiling,
                },
            );
        }
    }

    let degraded_fields: Vec<FieldKind> = config
        .required_fields
        .iter()
        .copied()
        .filter(|f| !fields.get(f).map_or(false, |s| s.fresh))
        .collect();
    let degraded = !degraded_fields.is_empty();

    MarketSnapshot {
        at: now,
        fields,
        degraded,
        degraded_fields,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::RawPayload;
    use crate::types::FetchStatus;
    use chrono::Duration;

    fn reading(
        provider: ProviderId,
        age_secs: i64,
        now: DateTime<Utc>,
        payload: RawPayload,
    ) -> RawReading {
        let at = now - Duration::seconds(age_secs);
        RawReading {
            provider,
            status: if age_secs == 0 {
                FetchStatus::Ok
            } else {
                FetchStatus::Stale
            },
            payload_at: at,
            polled_at: now,
            payload,
        }
    }

    fn price_payload(price: f64) -> RawPayload {
        RawPayload {
            price: Some(price),
            volume_24h: Some(1_000_000.0),
            ..Default::default()
        }
    }

    #[test]
    fn freshest_provider_wins_per_field() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(
            ProviderId::Binance,
            reading(ProviderId::Binance, 120, now, price_payload(50_000.0)),
        );
        readings.insert(
            ProviderId::Bybit,
            reading(ProviderId::Bybit, 10, now, price_payload(50_100.0)),
        );

        let snap = assemble(&readings, now, &cfg);
        let sample = snap.fields.get(&FieldKind::Price).unwrap();
        assert_eq!(sample.provider, ProviderId::Bybit);
        assert_eq!(sample.value, 50_100.0);
        assert!(!snap.degraded);
    }

    #[test]
    fn equal_freshness_tie_breaks_by_priority() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(
            ProviderId::Bybit,
            reading(ProviderId::Bybit, 5, now, price_payload(50_100.0)),
        );
        readings.insert(
            ProviderId::Binance,
            reading(ProviderId::Binance, 5, now, price_payload(50_000.0)),
        );

        let snap = assemble(&readings, now, &cfg);
        // Binance outranks Bybit in the default priority order.
        assert_eq!(
            snap.fields.get(&FieldKind::Price).unwrap().provider,
            ProviderId::Binance
        );
    }

    #[test]
    fn stale_required_field_degrades_snapshot_but_keeps_value() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(
            ProviderId::Binance,
            reading(ProviderId::Binance, 600, now, price_payload(50_000.0)),
        );

        let snap = assemble(&readings, now, &cfg);
        assert!(snap.degraded);
        assert!(snap.degraded_fields.contains(&FieldKind::Price));
        // Carry-forward value still present for conservative fallback.
        assert_eq!(snap.value(FieldKind::Price), Some(50_000.0));
        assert_eq!(snap.fresh_value(FieldKind::Price), None);
    }

    #[test]
    fn empty_reading_set_yields_fully_degraded_snapshot() {
        let cfg = EngineConfig::default();
        let snap = assemble(&HashMap::new(), Utc::now(), &cfg);
        assert!(snap.degraded);
        assert_eq!(snap.degraded_fields, cfg.required_fields);
        assert!(snap.fields.is_empty());
    }

    #[test]
    fn single_successful_field_still_produces_snapshot() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(
            ProviderId::Sentiment,
            reading(
                ProviderId::Sentiment,
                0,
                now,
                RawPayload {
                    fear_greed_index: Some(25.0),
                    ..Default::default()
                },
            ),
        );

        let snap = assemble(&readings, now, &cfg);
        // Required price/volume are missing so the snapshot is degraded, but
        // the cycle is never dropped.
        assert!(snap.degraded);
        assert_eq!(snap.fresh_value(FieldKind::FearGreedIndex), Some(25.0));
    }

    #[test]
    fn assemble_is_deterministic() {
        let cfg = EngineConfig::default();
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(
            ProviderId::Binance,
            reading(ProviderId::Binance, 30, now, price_payload(49_500.0)),
        );
        readings.insert(
            ProviderId::Bybit,
            reading(ProviderId::Bybit, 30, now, price_payload(49_400.0)),
        );

        let a = assemble(&readings, now, &cfg);
        let b = assemble(&readings, now, &cfg);
        assert_eq!(a.value(FieldKind::Price), b.value(FieldKind::Price));
        assert_eq!(a.degraded, b.degraded);
        assert_eq!(
            a.fields.get(&FieldKind::Price).unwrap().provider,
            b.fields.get(&FieldKind::Price).unwrap().provider
        );
    }
}
