// =============================================================================
// Shared types used across the Futures Sentinel engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Identity of an upstream market-data provider.
///
/// Providers supply overlapping field sets; the aggregator resolves conflicts
/// by freshness first, then by the configured priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    Binance,
    Bybit,
    Coinglass,
    Sentiment,
}

impl ProviderId {
    /// All known providers, in the default priority order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Binance,
        ProviderId::Bybit,
        ProviderId::Coinglass,
        ProviderId::Sentiment,
    ];
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Bybit => write!(f, "bybit"),
            Self::Coinglass => write!(f, "coinglass"),
            Self::Sentiment => write!(f, "sentiment"),
        }
    }
}

/// A single logical market field that one or more providers can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Price,
    Volume24h,
    TakerBuyVolume,
    TakerSellVolume,
    FundingRate,
    OpenInterest,
    LongShortRatio,
    LiquidationLongNotional,
    LiquidationShortNotional,
    FearGreedIndex,
}

impl FieldKind {
    pub const ALL: [FieldKind; 10] = [
        FieldKind::Price,
        FieldKind::Volume24h,
        FieldKind::TakerBuyVolume,
        FieldKind::TakerSellVolume,
        FieldKind::FundingRate,
        FieldKind::OpenInterest,
        FieldKind::LongShortRatio,
        FieldKind::LiquidationLongNotional,
        FieldKind::LiquidationShortNotional,
        FieldKind::FearGreedIndex,
    ];
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Price => "price",
            Self::Volume24h => "volume_24h",
            Self::TakerBuyVolume => "taker_buy_volume",
            Self::TakerSellVolume => "taker_sell_volume",
            Self::FundingRate => "funding_rate",
            Self::OpenInterest => "open_interest",
            Self::LongShortRatio => "long_short_ratio",
            Self::LiquidationLongNotional => "liquidation_long_notional",
            Self::LiquidationShortNotional => "liquidation_short_notional",
            Self::FearGreedIndex => "fear_greed_index",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a single adapter poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Fresh data fetched this poll.
    Ok,
    /// Poll failed but a cached last-known-good payload is attached.
    Stale,
    /// Poll failed and no usable cache exists.
    Failed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Stale => write!(f, "stale"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Severity tier for an anomaly event, derived from how far the measured
/// value exceeds the rule threshold (1x / 2x / 3x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a threshold-excess ratio to a severity tier.
    pub fn from_excess_ratio(ratio: f64) -> Self {
        if ratio >= 3.0 {
            Self::Critical
        } else if ratio >= 2.0 {
            Self::High
        } else if ratio >= 1.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Kind of anomaly event the detector can emit. Cooldown dedup is tracked
/// per kind, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PriceShock,
    VolumeSurge,
    FundingExtreme,
    LiquidationCluster,
    LongShortExtreme,
    SentimentExtreme,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::PriceShock,
        EventKind::VolumeSurge,
        EventKind::FundingExtreme,
        EventKind::LiquidationCluster,
        EventKind::LongShortExtreme,
        EventKind::SentimentExtreme,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PriceShock => "price-shock",
            Self::VolumeSurge => "volume-surge",
            Self::FundingExtreme => "funding-extreme",
            Self::LiquidationCluster => "liquidation-cluster",
            Self::LongShortExtreme => "long-short-extreme",
            Self::SentimentExtreme => "sentiment-extreme",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tiers_escalate_with_excess() {
        assert_eq!(Severity::from_excess_ratio(0.5), Severity::Low);
        assert_eq!(Severity::from_excess_ratio(1.0), Severity::Medium);
        assert_eq!(Severity::from_excess_ratio(2.4), Severity::High);
        assert_eq!(Severity::from_excess_ratio(3.0), Severity::Critical);
    }

    #[test]
    fn event_kind_serialises_kebab_case() {
        let json = serde_json::to_string(&EventKind::PriceShock).unwrap();
        assert_eq!(json, "\"price-shock\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::PriceShock);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }
}
