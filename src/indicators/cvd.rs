// =============================================================================
// Cumulative Volume Delta — Net taker buy minus sell over a rolling window
// =============================================================================
//
// Sums (taker buy - taker sell) per snapshot across the window. Positive means
// aggressive buyers dominated, a momentum-aligned bullish read. `aux` is the
// pressure ratio buy/sell over the same window.

use chrono::{DateTime, Utc};

use crate::snapshot::MarketSnapshot;
use crate::types::FieldKind;

use super::{IndicatorName, IndicatorValue};

pub fn compute(
    snapshots: &[MarketSnapshot],
    window_mins: i64,
    at: DateTime<Utc>,
) -> Option<IndicatorValue> {
    // Taker flow is only meaningful fresh; if the newest snapshot lacks a
    // fresh pair, the indicator sits the cycle out.
    let newest = snapshots.last()?;
    if newest.at != at
        || !newest.has_fresh(FieldKind::TakerBuyVolume)
        || !newest.has_fresh(FieldKind::TakerSellVolume)
    {
        return None;
    }

    let mut delta = 0.0;
    let mut buy_total = 0.0;
    let mut sell_total = 0.0;
    let mut points = 0usize;
    for snap in snapshots {
        let (Some(buy), Some(sell)) = (
            snap.fresh_value(FieldKind::TakerBuyVolume),
            snap.fresh_value(FieldKind::TakerSellVolume),
        ) else {
            continue;
        };
        delta += buy - sell;
        buy_total += buy;
        sell_total += sell;
        points += 1;
    }
    if points < 2 {
        return None;
    }

    let ratio = if sell_total > 0.0 {
        buy_total / sell_total
    } else {
        f64::INFINITY
    };

    let detail = if delta > 0.0 {
        format!("Net taker buying {delta:+.0} over {window_mins}m (pressure {ratio:.2}) - momentum bullish")
    } else if delta < 0.0 {
        format!("Net taker selling {delta:+.0} over {window_mins}m (pressure {ratio:.2}) - momentum bearish")
    } else {
        format!("Taker flow balanced over {window_mins}m")
    };

    Some(IndicatorValue {
        name: IndicatorName::Cvd,
        value: delta,
        aux: Some(ratio),
        extreme: false,
        window: format!("{window_mins}m"),
        at,
        detail,
    })
}
