// =============================================================================
// Funding-Rate Trend — Least-squares slope over recent funding readings
// =============================================================================
//
// Positive funding means longs pay shorts; a rising-positive trend signals
// crowded longs and is read as a contrarian short setup (and vice versa).
// `value` is the per-point slope of the fitted line, `aux` carries the latest
// funding rate in percent.

use chrono::{DateTime, Utc};

use super::{IndicatorName, IndicatorValue};

/// Fit a funding slope over `series` (oldest first). Returns `None` until the
/// series holds at least `min_points` fresh readings.
pub fn compute(
    series: &[f64],
    min_points: usize,
    extreme_pct: f64,
    at: DateTime<Utc>,
) -> Option<IndicatorValue> {
    if series.len() < min_points.max(2) {
        return None;
    }

    let slope = least_squares_slope(series);
    let latest = *series.last()?;
    let extreme = latest.abs() >= extreme_pct;

    let detail = match (slope > 0.0, latest > 0.0) {
        (true, true) => format!(
            "Funding rising at {latest:.4}% - longs increasingly crowded, contrarian short lean"
        ),
        (false, false) => format!(
            "Funding falling at {latest:.4}% - shorts increasingly crowded, contrarian long lean"
        ),
        _ => format!("Funding {latest:.4}%, slope {slope:+.5}/pt - mixed, weak lean"),
    };

    Some(IndicatorValue {
        name: IndicatorName::FundingTrend,
        value: slope,
        aux: Some(latest),
        extreme,
        window: format!("{} points", series.len()),
        at,
        detail,
    })
}

/// Ordinary least-squares slope with x = 0..n-1.
fn least_squares_slope(series: &[f64]) -> f64 {
    let n = series.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_series_has_positive_slope() {
        let series = vec![0.01, 0.015, 0.02, 0.025, 0.03, 0.035, 0.04, 0.045];
        let v = compute(&series, 8, 0.05, Utc::now()).unwrap();
        assert!(v.value > 0.0);
        assert_eq!(v.aux, Some(0.045));
        assert!(!v.extreme);
    }

    #[test]
    fn falling_series_has_negative_slope() {
        let series = vec![0.04, 0.03, 0.02, 0.01, 0.0, -0.01, -0.02, -0.03];
        let v = compute(&series, 8, 0.05, Utc::now()).unwrap();
        assert!(v.value < 0.0);
    }

    #[test]
    fn flat_series_has_zero_slope() {
        let series = vec![0.01; 8];
        let v = compute(&series, 8, 0.05, Utc::now()).unwrap();
        assert!(v.value.abs() < 1e-12);
    }

    #[test]
    fn extreme_flag_tracks_latest_rate_magnitude() {
        let hot = vec![0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.09];
        assert!(compute(&hot, 8, 0.05, Utc::now()).unwrap().extreme);

        let cold: Vec<f64> = hot.iter().map(|r| -r).collect();
        assert!(compute(&cold, 8, 0.05, Utc::now()).unwrap().extreme);
    }

    #[test]
    fn short_series_is_omitted() {
        assert!(compute(&[0.01, 0.02, 0.03], 8, 0.05, Utc::now()).is_none());
        assert!(compute(&[], 8, 0.05, Utc::now()).is_none());
    }

    #[test]
    fn slope_matches_hand_computed_fit() {
        // y = 0.005x + 0.01 exactly.
        let series: Vec<f64> = (0..8).map(|i| 0.01 + 0.005 * i as f64).collect();
        let v = compute(&series, 8, 0.05, Utc::now()).unwrap();
        assert!((v.value - 0.005).abs() < 1e-12);
    }
}
