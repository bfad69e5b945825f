// =============================================================================
// OI / Price Divergence — Direction agreement between open interest and price
// =============================================================================
//
// Compares the change in open interest against the change in price over the
// same window. Agreement (both up, or both down) confirms the move; divergence
// (OI up while price falls, or OI down while price rises) flags positioning
// that the move is not supported by and sets the extreme flag.
//
// `value` is a lean in [-1, 1]: positive leans bullish, negative bearish.
// `aux` is the OI change percent over the window.

use chrono::{DateTime, Utc};

use crate::snapshot::MarketSnapshot;
use crate::types::FieldKind;

use super::{fresh_series, IndicatorName, IndicatorValue};

const ALIGNED_LEAN: f64 = 0.8;
const DIVERGENT_LEAN: f64 = 0.3;

/// Movements smaller than this percent are treated as flat.
const FLAT_PCT: f64 = 0.05;

pub fn compute(
    snapshots: &[MarketSnapshot],
    min_points: usize,
    at: DateTime<Utc>,
) -> Option<IndicatorValue> {
    let oi = fresh_series(snapshots, FieldKind::OpenInterest, at);
    let price = fresh_series(snapshots, FieldKind::Price, at);
    if oi.len() < min_points.max(2) || price.len() < 2 {
        return None;
    }

    let oi_pct = pct_change(oi[0], *oi.last()?)?;
    let price_pct = pct_change(price[0], *price.last()?)?;

    let oi_up = oi_pct > FLAT_PCT;
    let oi_down = oi_pct < -FLAT_PCT;
    let price_up = price_pct > FLAT_PCT;
    let price_down = price_pct < -FLAT_PCT;

    let (value, extreme, detail) = if oi_up && price_up {
        (
            ALIGNED_LEAN,
            false,
            format!("OI +{oi_pct:.2}% with price +{price_pct:.2}% - new longs funding the rally"),
        )
    } else if oi_up && price_down {
        (
            -DIVERGENT_LEAN,
            true,
            format!("OI +{oi_pct:.2}% against price {price_pct:.2}% - shorts pressing into weakness"),
        )
    } else if oi_down && price_up {
        (
            DIVERGENT_LEAN,
            true,
            format!("OI {oi_pct:.2}% against price +{price_pct:.2}% - short-covering rally"),
        )
    } else if oi_down && price_down {
        (
            -ALIGNED_LEAN,
            false,
            format!("OI {oi_pct:.2}% with price {price_pct:.2}% - longs unwinding"),
        )
    } else {
        (
            0.0,
            false,
            format!("OI {oi_pct:+.2}%, price {price_pct:+.2}% - no meaningful divergence"),
        )
    };

    Some(IndicatorValue {
        name: IndicatorName::OiPriceDivergence,
        value,
        aux: Some(oi_pct),
        extreme,
        window: format!("{} points", snapshots.len()),
        at,
        detail,
    })
}

fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        return None;
    }
    Some((to - from) / from * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::snapshot_with;
    use chrono::Duration;

    fn snaps(pairs: &[(f64, f64)]) -> (Vec<MarketSnapshot>, DateTime<Utc>) {
        let base = Utc::now();
        let out: Vec<MarketSnapshot> = pairs
            .iter()
            .enumerate()
            .map(|(i, (price, oi))| {
                snapshot_with(
                    base + Duration::minutes(i as i64),
                    &[(FieldKind::Price, *price), (FieldKind::OpenInterest, *oi)],
                )
            })
            .collect();
        let at = out.last().unwrap().at;
        (out, at)
    }

    #[test]
    fn both_rising_confirms_bullish() {
        let (snaps, at) = snaps(&[(100.0, 1000.0), (101.0, 1010.0), (102.0, 1025.0)]);
        let v = compute(&snaps, 3, at).unwrap();
        assert_eq!(v.value, ALIGNED_LEAN);
        assert!(!v.extreme);
    }

    #[test]
    fn both_falling_confirms_bearish() {
        let (snaps, at) = snaps(&[(102.0, 1025.0), (101.0, 1010.0), (100.0, 1000.0)]);
        let v = compute(&snaps, 3, at).unwrap();
        assert_eq!(v.value, -ALIGNED_LEAN);
        assert!(!v.extreme);
    }

    #[test]
    fn oi_up_price_down_is_bearish_divergence() {
        let (snaps, at) = snaps(&[(102.0, 1000.0), (101.0, 1015.0), (100.0, 1030.0)]);
        let v = compute(&snaps, 3, at).unwrap();
        assert_eq!(v.value, -DIVERGENT_LEAN);
        assert!(v.extreme);
    }

    #[test]
    fn oi_down_price_up_is_short_covering() {
        let (snaps, at) = snaps(&[(100.0, 1030.0), (101.0, 1015.0), (102.0, 1000.0)]);
        let v = compute(&snaps, 3, at).unwrap();
        assert_eq!(v.value, DIVERGENT_LEAN);
        assert!(v.extreme);
    }

    #[test]
    fn flat_moves_are_neutral() {
        let (snaps, at) = snaps(&[(100.0, 1000.0), (100.01, 1000.1), (100.02, 1000.2)]);
        let v = compute(&snaps, 3, at).unwrap();
        assert_eq!(v.value, 0.0);
        assert!(!v.extreme);
    }

    #[test]
    fn insufficient_oi_points_omits() {
        let (snaps, at) = snaps(&[(100.0, 1000.0), (101.0, 1010.0)]);
        assert!(compute(&snaps, 3, at).is_none());
    }
}
