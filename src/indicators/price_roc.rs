// =============================================================================
// Price Rate of Change — Percent move over a short snapshot lookback
// =============================================================================
//
// `value` is the percent change from the oldest to the newest fresh price in
// the lookback. Feeds the contrarian side of the scorer and the price-shock
// rule in the detector.

use chrono::{DateTime, Utc};

use super::{IndicatorName, IndicatorValue};

pub fn compute(series: &[f64], min_points: usize, at: DateTime<Utc>) -> Option<IndicatorValue> {
    if series.len() < min_points.max(2) {
        return None;
    }
    let first = series[0];
    if first == 0.0 {
        return None;
    }
    let latest = *series.last()?;
    let roc_pct = (latest - first) / first * 100.0;

    let detail = if roc_pct.abs() < 0.5 {
        format!("Price {roc_pct:+.2}% over {} snapshots - quiet", series.len())
    } else if roc_pct > 0.0 {
        format!("Price {roc_pct:+.2}% over {} snapshots - sharp rise", series.len())
    } else {
        format!("Price {roc_pct:+.2}% over {} snapshots - sharp drop", series.len())
    };

    Some(IndicatorValue {
        name: IndicatorName::PriceRoc,
        value: roc_pct,
        aux: Some(latest),
        extreme: roc_pct.abs() >= 2.0,
        window: format!("{} points", series.len()),
        at,
        detail,
    })
}
