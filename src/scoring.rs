// =============================================================================
// Scoring Engine — Weighted composite of indicator leans
// =============================================================================
//
// Converts the current indicator set into a long score and a short score, each
// clamped to [0, 100]. Per indicator, a scoring rule maps the value to a lean
// fraction in [0, 1] for one side; the fraction is multiplied by the weight
// table row and added to that side. An indicator missing from the set
// contributes nothing, so a cold pipeline scores 0/0 rather than inventing a
// neutral midpoint.
//
// Contrarian rules: funding trend, long/short ratio, sentiment, liquidation
// density, and price rate of change all score AGAINST the crowd or the move.
// Momentum rules: OI/price divergence and CVD score WITH the flow.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine_config::EngineConfig;
use crate::indicators::{IndicatorName, IndicatorSet, IndicatorValue};

/// Which side, if either, the composite favours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

/// Minimum score gap before the composite declares a bias.
const BIAS_GAP: f64 = 10.0;

/// One indicator's contribution to the composite, kept for the report layer.
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub indicator: IndicatorName,
    pub long_points: f64,
    pub short_points: f64,
    pub detail: String,
}

/// The composite score for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub at: DateTime<Utc>,
    pub long_score: f64,
    pub short_score: f64,
    pub bias: Bias,
    pub contributions: Vec<Contribution>,
    /// Indicators present in the weight table but absent from this cycle's
    /// set. Non-empty means the composite is running on partial coverage.
    pub missing: Vec<IndicatorName>,
}

/// Stateless scorer; all weights come from the config table.
pub struct ScoreEngine {
    config: EngineConfig,
}

impl ScoreEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, indicators: &IndicatorSet, at: DateTime<Utc>) -> ScoreResult {
        let mut long_score = 0.0;
        let mut short_score = 0.0;
        let mut contributions = Vec::new();
        let mut missing = Vec::new();

        for name in IndicatorName::ALL {
            let Some(weight) = self.config.weight_for(name.as_str()) else {
                continue;
            };
            let Some(value) = indicators.get(&name) else {
                missing.push(name);
                continue;
            };

            let (long_frac, short_frac) = lean_for(name, value);
            let long_points = long_frac * weight.long_weight;
            let short_points = short_frac * weight.short_weight;
            long_score += long_points;
            short_score += short_points;

            contributions.push(Contribution {
                indicator: name,
                long_points,
                short_points,
                detail: value.detail.clone(),
            });
        }

        let long_score = long_score.clamp(0.0, 100.0);
        let short_score = short_score.clamp(0.0, 100.0);
        let bias = if long_score - short_score >= BIAS_GAP {
            Bias::Bullish
        } else if short_score - long_score >= BIAS_GAP {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        ScoreResult {
            at,
            long_score,
            short_score,
            bias,
            contributions,
            missing,
        }
    }
}

/// Map one indicator value to (long lean, short lean) fractions in [0, 1].
fn lean_for(name: IndicatorName, v: &IndicatorValue) -> (f64, f64) {
    match name {
        // Contrarian: positive funding with a rising slope means crowded
        // longs paying up; lean short. Symmetric for negative funding.
        IndicatorName::FundingTrend => {
            let rate = v.aux.unwrap_or(0.0);
            let aligned = (rate > 0.0) == (v.value > 0.0);
            let frac = if v.extreme {
                1.0
            } else if aligned {
                0.6
            } else {
                0.3
            };
            if rate > 0.0 {
                (0.0, frac)
            } else if rate < 0.0 {
                (frac, 0.0)
            } else {
                (0.0, 0.0)
            }
        }

        // Momentum: value is already a signed lean in [-1, 1].
        IndicatorName::OiPriceDivergence => {
            (v.value.max(0.0).min(1.0), (-v.value).max(0.0).min(1.0))
        }

        // Momentum: direction from the net delta, intensity from the
        // buy/sell pressure ratio.
        IndicatorName::Cvd => {
            let ratio = v.aux.unwrap_or(1.0);
            let frac = if ratio >= 1.5 || ratio <= 1.0 / 1.5 {
                1.0
            } else if ratio >= 1.2 || ratio <= 1.0 / 1.2 {
                0.6
            } else {
                0.3
            };
            if v.value > 0.0 {
                (frac, 0.0)
            } else if v.value < 0.0 {
                (0.0, frac)
            } else {
                (0.0, 0.0)
            }
        }

        // Contrarian: a one-sided flush washes that side's leverage out.
        IndicatorName::LiquidationDensity => {
            if v.value <= 0.0 {
                return (0.0, 0.0);
            }
            let long_share = v.aux.unwrap_or(0.5);
            if long_share >= 0.65 {
                (1.0, 0.0)
            } else if long_share <= 0.35 {
                (0.0, 1.0)
            } else {
                (0.0, 0.0)
            }
        }

        // Contrarian: crowded longs lean short, crowded shorts lean long.
        IndicatorName::LongShortRatio => {
            let ratio = v.value;
            if ratio >= 2.0 {
                (0.0, 1.0)
            } else if ratio >= 1.5 {
                (0.0, 0.5)
            } else if ratio <= 0.5 {
                (1.0, 0.0)
            } else if ratio <= 1.0 / 1.5 {
                (0.5, 0.0)
            } else {
                (0.0, 0.0)
            }
        }

        // Contrarian: extreme fear is a long setup, extreme greed a short.
        IndicatorName::Sentiment => {
            let fg = v.value;
            if fg <= 20.0 {
                (1.0, 0.0)
            } else if fg <= 35.0 {
                (0.5, 0.0)
            } else if fg >= 80.0 {
                (0.0, 1.0)
            } else if fg >= 65.0 {
                (0.0, 0.5)
            } else {
                (0.0, 0.0)
            }
        }

        // Contrarian: a sharp pump scores short, a sharp dump scores long.
        IndicatorName::PriceRoc => {
            let roc = v.value;
            let frac = if roc.abs() >= 2.0 {
                1.0
            } else if roc.abs() >= 1.0 {
                0.5
            } else {
                return (0.0, 0.0);
            };
            if roc > 0.0 {
                (0.0, frac)
            } else {
                (frac, 0.0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
