// =============================================================================
// Long/Short Ratio — Account positioning with rate of change
// =============================================================================
//
// Ratio of long to short accounts. Far above 1 means retail is crowded long
// (contrarian bearish); far below means crowded short (contrarian bullish).
// `value` is the latest ratio, `aux` its percent change across the window.

use chrono::{DateTime, Utc};

use crate::snapshot::MarketSnapshot;
use crate::types::FieldKind;

use super::{fresh_series, IndicatorName, IndicatorValue};

pub fn compute(snapshots: &[MarketSnapshot], at: DateTime<Utc>) -> Option<IndicatorValue> {
    let series = fresh_series(snapshots, FieldKind::LongShortRatio, at);
    if series.len() < 2 {
        return None;
    }

    let first = series[0];
    let latest = *series.last()?;
    let roc_pct = if first > 0.0 {
        Some((latest - first) / first * 100.0)
    } else {
        None
    };

    let detail = if latest >= 2.0 {
        format!("Long/short {latest:.2} - longs heavily crowded, contrarian short lean")
    } else if latest <= 0.5 {
        format!("Long/short {latest:.2} - shorts heavily crowded, contrarian long lean")
    } else {
        format!("Long/short {latest:.2} - positioning balanced")
    };

    Some(IndicatorValue {
        name: IndicatorName::LongShortRatio,
        value: latest,
        aux: roc_pct,
        extreme: latest >= 2.0 || latest <= 0.5,
        window: format!("{} points", series.len()),
        at,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{mark_all_stale, snapshot_with};
    use chrono::Duration;

    fn ratio_snaps(ratios: &[f64]) -> (Vec<MarketSnapshot>, DateTime<Utc>) {
        let base = Utc::now();
        let out: Vec<MarketSnapshot> = ratios
            .iter()
            .enumerate()
            .map(|(i, r)| {
                snapshot_with(
                    base + Duration::minutes(i as i64),
                    &[(FieldKind::LongShortRatio, *r)],
                )
            })
            .collect();
        let at = out.last().unwrap().at;
        (out, at)
    }

    #[test]
    fn latest_ratio_and_roc_reported() {
        let (snaps, at) = ratio_snaps(&[1.0, 1.1, 1.2]);
        let v = compute(&snaps, at).unwrap();
        assert_eq!(v.value, 1.2);
        let roc = v.aux.unwrap();
        assert!((roc - 20.0).abs() < 1e-9);
        assert!(!v.extreme);
    }

    #[test]
    fn crowded_long_is_extreme() {
        let (snaps, at) = ratio_snaps(&[1.8, 2.1, 2.4]);
        let v = compute(&snaps, at).unwrap();
        assert!(v.extreme);
    }

    #[test]
    fn crowded_short_is_extreme() {
        let (snaps, at) = ratio_snaps(&[0.6, 0.5, 0.4]);
        let v = compute(&snaps, at).unwrap();
        assert!(v.extreme);
    }

    #[test]
    fn single_point_is_omitted() {
        let (snaps, at) = ratio_snaps(&[1.2]);
        assert!(compute(&snaps, at).is_none());
    }

    #[test]
    fn stale_latest_snapshot_omits() {
        let (mut snaps, at) = ratio_snaps(&[1.0, 1.1, 1.2]);
        mark_all_stale(snaps.last_mut().unwrap());
        assert!(compute(&snaps, at).is_none());
    }
}
