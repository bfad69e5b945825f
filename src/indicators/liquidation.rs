// =============================================================================
// Liquidation Density — Forced-liquidation notional clustered near the price
// =============================================================================
//
// The liquidation feed reports rolling totals, so per-snapshot activity is the
// positive delta between consecutive snapshots. A delta is counted only when
// the snapshot's own price sat inside the configured band around the current
// price; liquidations far from here do not pressure this level.
//
// The feed is slow and its totals change slowly, so carry-forward values are
// acceptable; a stale reading simply contributes zero delta.
//
// `value` is total in-band notional, `aux` the long share of it (0..1). Heavy
// long liquidations near the price are read as a contrarian long setup (the
// flush washes leverage out), and vice versa.

use chrono::{DateTime, Utc};

use crate::snapshot::MarketSnapshot;
use crate::types::FieldKind;

use super::{IndicatorName, IndicatorValue};

pub fn compute(
    snapshots: &[MarketSnapshot],
    newest: &MarketSnapshot,
    band_pct: f64,
    window_mins: i64,
    at: DateTime<Utc>,
) -> Option<IndicatorValue> {
    let current_price = newest.value(FieldKind::Price)?;
    if snapshots.len() < 2 {
        return None;
    }
    let band = current_price * band_pct / 100.0;

    let mut long_in_band = 0.0;
    let mut short_in_band = 0.0;
    let mut deltas = 0usize;

    for pair in snapshots.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let (Some(prev_long), Some(curr_long)) = (
            prev.value(FieldKind::LiquidationLongNotional),
            curr.value(FieldKind::LiquidationLongNotional),
        ) else {
            continue;
        };
        let (Some(prev_short), Some(curr_short)) = (
            prev.value(FieldKind::LiquidationShortNotional),
            curr.value(FieldKind::LiquidationShortNotional),
        ) else {
            continue;
        };
        deltas += 1;

        let Some(snap_price) = curr.value(FieldKind::Price) else {
            continue;
        };
        if (snap_price - current_price).abs() > band {
            continue;
        }

        // Rolling totals can shrink as old entries age out of the upstream
        // window; only growth represents new liquidations.
        long_in_band += (curr_long - prev_long).max(0.0);
        short_in_band += (curr_short - prev_short).max(0.0);
    }

    if deltas == 0 {
        return None;
    }

    let total = long_in_band + short_in_band;
    let long_share = if total > 0.0 {
        long_in_band / total
    } else {
        0.5
    };

    let detail = if total <= 0.0 {
        format!("No liquidations within {band_pct}% of price in the last {window_mins}m")
    } else if long_share >= 0.65 {
        format!(
            "${total:.0} liquidated in-band, {:.0}% longs - leverage flush, contrarian long lean",
            long_share * 100.0
        )
    } else if long_share <= 0.35 {
        format!(
            "${total:.0} liquidated in-band, {:.0}% shorts - squeeze, contrarian short lean",
            (1.0 - long_share) * 100.0
        )
    } else {
        format!("${total:.0} liquidated in-band, two-sided")
    };

    Some(IndicatorValue {
        name: IndicatorName::LiquidationDensity,
        value: total,
        aux: Some(long_share),
        extreme: false,
        window: format!("{window_mins}m @ {band_pct}%"),
        at,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::snapshot_with;
    use chrono::Duration;

    fn snap(
        at: DateTime<Utc>,
        price: f64,
        long_total: f64,
        short_total: f64,
    ) -> MarketSnapshot {
        snapshot_with(
            at,
            &[
                (FieldKind::Price, price),
                (FieldKind::LiquidationLongNotional, long_total),
                (FieldKind::LiquidationShortNotional, short_total),
            ],
        )
    }

    #[test]
    fn in_band_deltas_accumulate() {
        let base = Utc::now();
        let snaps = vec![
            snap(base, 50_000.0, 1_000_000.0, 500_000.0),
            snap(base + Duration::minutes(1), 50_100.0, 1_300_000.0, 500_000.0),
            snap(base + Duration::minutes(2), 50_200.0, 1_600_000.0, 600_000.0),
        ];
        let newest = snaps.last().unwrap().clone();
        let v = compute(&snaps, &newest, 1.5, 60, newest.at).unwrap();
        // Deltas: +300k long, then +300k long +100k short, all in band.
        assert_eq!(v.value, 700_000.0);
        let share = v.aux.unwrap();
        assert!((share - 600_000.0 / 700_000.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_band_deltas_are_excluded() {
        let base = Utc::now();
        let snaps = vec![
            snap(base, 48_000.0, 1_000_000.0, 500_000.0),
            // +2000 at 48k is >1.5% away from the 50k current price.
            snap(base + Duration::minutes(1), 48_100.0, 2_000_000.0, 500_000.0),
            snap(base + Duration::minutes(2), 50_000.0, 2_100_000.0, 500_000.0),
        ];
        let newest = snaps.last().unwrap().clone();
        let v = compute(&snaps, &newest, 1.5, 60, newest.at).unwrap();
        assert_eq!(v.value, 100_000.0);
    }

    #[test]
    fn shrinking_totals_contribute_zero() {
        let base = Utc::now();
        let snaps = vec![
            snap(base, 50_000.0, 2_000_000.0, 800_000.0),
            snap(base + Duration::minutes(1), 50_050.0, 1_500_000.0, 700_000.0),
        ];
        let newest = snaps.last().unwrap().clone();
        let v = compute(&snaps, &newest, 1.5, 60, newest.at).unwrap();
        assert_eq!(v.value, 0.0);
        assert_eq!(v.aux, Some(0.5));
    }

    #[test]
    fn missing_liquidation_fields_omit_indicator() {
        let base = Utc::now();
        let snaps = vec![
            snapshot_with(base, &[(FieldKind::Price, 50_000.0)]),
            snapshot_with(base + Duration::minutes(1), &[(FieldKind::Price, 50_050.0)]),
        ];
        let newest = snaps.last().unwrap().clone();
        assert!(compute(&snaps, &newest, 1.5, 60, newest.at).is_none());
    }

    #[test]
    fn missing_price_omits_indicator() {
        let base = Utc::now();
        let snaps = vec![
            snap(base, 50_000.0, 1_000_000.0, 500_000.0),
            snap(base + Duration::minutes(1), 50_050.0, 1_100_000.0, 500_000.0),
        ];
        let mut newest = snaps.last().unwrap().clone();
        newest.fields.remove(&FieldKind::Price);
        assert!(compute(&snaps, &newest, 1.5, 60, newest.at).is_none());
    }
}
