use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading signal derived from the final composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalLabel {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalLabel {
    /// Map a final score in [-10, +10] onto a signal label.
    pub fn from_score(score: f64) -> Self {
        if score >= 6.0 {
            SignalLabel::StrongBuy
        } else if score >= 3.0 {
            SignalLabel::Buy
        } else if score > -3.0 {
            SignalLabel::Neutral
        } else if score > -6.0 {
            SignalLabel::Sell
        } else {
            SignalLabel::StrongSell
        }
    }

    /// Human-readable label for reports and exports
    pub fn label(&self) -> &'static str {
        match self {
            SignalLabel::StrongBuy => "STRONG BUY",
            SignalLabel::Buy => "BUY",
            SignalLabel::Neutral => "NEUTRAL / HOLD",
            SignalLabel::Sell => "SELL / AVOID",
            SignalLabel::StrongSell => "STRONG SELL",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, SignalLabel::StrongBuy | SignalLabel::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, SignalLabel::Sell | SignalLabel::StrongSell)
    }
}

/// Scoring category of the multi-factor model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    TrendMomentum,
    Volume,
    Fundamental,
    MarketContext,
    Advanced,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::TrendMomentum,
        Category::Volume,
        Category::Fundamental,
        Category::MarketContext,
        Category::Advanced,
    ];

    /// Stable key used in config files and exports
    pub fn key(&self) -> &'static str {
        match self {
            Category::TrendMomentum => "trend_momentum",
            Category::Volume => "volume",
            Category::Fundamental => "fundamental",
            Category::MarketContext => "market_context",
            Category::Advanced => "advanced",
        }
    }
}

/// Per-category sub-scores, each in [-100, +100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub trend_momentum: f64,
    pub volume: f64,
    pub fundamental: f64,
    pub market_context: f64,
    pub advanced: f64,
}

impl CategoryScores {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::TrendMomentum => self.trend_momentum,
            Category::Volume => self.volume,
            Category::Fundamental => self.fundamental,
            Category::MarketContext => self.market_context,
            Category::Advanced => self.advanced,
        }
    }
}

/// Category weights for the composite blend.
///
/// Invariant: the weights of a vector accepted for scoring sum to 1.0
/// within [`CategoryWeights::SUM_TOLERANCE`]; `normalize` rescales to
/// exactly 1.0 after any adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub trend_momentum: f64,
    pub volume: f64,
    pub fundamental: f64,
    pub market_context: f64,
    pub advanced: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            trend_momentum: 0.30,
            volume: 0.15,
            fundamental: 0.22,
            market_context: 0.18,
            advanced: 0.15,
        }
    }
}

impl CategoryWeights {
    /// Accepted deviation of the raw sum from 1.0
    pub const SUM_TOLERANCE: f64 = 0.02;

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::TrendMomentum => self.trend_momentum,
            Category::Volume => self.volume,
            Category::Fundamental => self.fundamental,
            Category::MarketContext => self.market_context,
            Category::Advanced => self.advanced,
        }
    }

    pub fn set(&mut self, category: Category, weight: f64) {
        match category {
            Category::TrendMomentum => self.trend_momentum = weight,
            Category::Volume => self.volume = weight,
            Category::Fundamental => self.fundamental = weight,
            Category::MarketContext => self.market_context = weight,
            Category::Advanced => self.advanced = weight,
        }
    }

    pub fn sum(&self) -> f64 {
        self.trend_momentum + self.volume + self.fundamental + self.market_context + self.advanced
    }

    /// Whether the raw sum lies within tolerance of 1.0
    pub fn is_valid(&self) -> bool {
        (self.sum() - 1.0).abs() <= Self::SUM_TOLERANCE
            && Category::ALL.iter().all(|c| self.get(*c) >= 0.0)
    }

    /// Rescale so the weights sum to exactly 1.0. A zero sum is left unchanged.
    pub fn normalized(mut self) -> Self {
        let total = self.sum();
        if total > 0.0 {
            for category in Category::ALL {
                self.set(category, self.get(category) / total);
            }
        }
        self
    }

    /// Weighted blend of category sub-scores, on the [-100, +100] scale.
    pub fn blend(&self, scores: &CategoryScores) -> f64 {
        Category::ALL
            .iter()
            .map(|c| self.get(*c) * scores.get(*c))
            .sum()
    }
}

/// Point-in-time fundamental statement snapshot.
///
/// `as_of` is the statement date; consumers apply the configured
/// reporting-lag offset before treating the snapshot as known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub as_of: Option<NaiveDate>,
    pub pe_ratio: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub market_cap: Option<f64>,
}

/// Complete scoring result for one ticker at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockScore {
    pub ticker: String,
    /// Composite score in [-10, +10]
    pub final_score: f64,
    /// Confidence multiplier applied to the raw blend
    pub confidence: f64,
    pub signal: SignalLabel,
    pub is_vetoed: bool,
    pub veto_reasons: Vec<String>,
    pub categories: CategoryScores,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_from_score_thresholds() {
        assert_eq!(SignalLabel::from_score(7.2), SignalLabel::StrongBuy);
        assert_eq!(SignalLabel::from_score(6.0), SignalLabel::StrongBuy);
        assert_eq!(SignalLabel::from_score(4.5), SignalLabel::Buy);
        assert_eq!(SignalLabel::from_score(0.0), SignalLabel::Neutral);
        assert_eq!(SignalLabel::from_score(-2.9), SignalLabel::Neutral);
        assert_eq!(SignalLabel::from_score(-4.0), SignalLabel::Sell);
        assert_eq!(SignalLabel::from_score(-8.0), SignalLabel::StrongSell);
    }

    #[test]
    fn test_weights_normalize_to_exactly_one() {
        let weights = CategoryWeights {
            trend_momentum: 0.31,
            volume: 0.16,
            fundamental: 0.21,
            market_context: 0.17,
            advanced: 0.14,
        }
        .normalized();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_weights_valid() {
        let weights = CategoryWeights::default();
        assert!(weights.is_valid());
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_out_of_tolerance_rejected() {
        let mut weights = CategoryWeights::default();
        weights.trend_momentum = 0.40;
        assert!(!weights.is_valid());
    }

    #[test]
    fn test_blend_is_weighted_sum() {
        let weights = CategoryWeights::default();
        let scores = CategoryScores {
            trend_momentum: 100.0,
            volume: 100.0,
            fundamental: 100.0,
            market_context: 100.0,
            advanced: 100.0,
        };
        assert!((weights.blend(&scores) - 100.0).abs() < 1e-9);
    }
}
