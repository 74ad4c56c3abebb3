pub mod indicators;
pub mod vetoes;

pub use vetoes::VetoRules;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use scoring_core::{
    Bar, CategoryScores, CategoryWeights, FundamentalSnapshot, HistoryProvider, ScoreProvider,
    ScoringError, SignalLabel, StockScore,
};

/// Calendar lookback fetched before the as-of date; generous enough for
/// a 200-day moving average plus a full 52-week range.
const LOOKBACK_CALENDAR_DAYS: i64 = 730;

/// Minimum bars the indicator stack needs to produce a meaningful score
const MIN_SCORING_BARS: usize = 200;

/// Quarterly fundamentals become known this many days after the
/// statement date (fixed reporting-lag approximation).
const REPORTING_LAG_DAYS: i64 = 45;

/// Weighted multi-factor score provider.
///
/// All price inputs are clipped to the as-of date before any indicator
/// runs, so the same instance can be replayed at arbitrary historical
/// dates without lookahead.
pub struct CompositeScorer {
    history: Arc<dyn HistoryProvider>,
    index_symbol: String,
    fundamentals: HashMap<String, FundamentalSnapshot>,
    veto_rules: VetoRules,
}

impl CompositeScorer {
    pub fn new(history: Arc<dyn HistoryProvider>, index_symbol: impl Into<String>) -> Self {
        Self {
            history,
            index_symbol: index_symbol.into(),
            fundamentals: HashMap::new(),
            veto_rules: VetoRules::default(),
        }
    }

    pub fn with_veto_rules(mut self, rules: VetoRules) -> Self {
        self.veto_rules = rules;
        self
    }

    /// Attach statement snapshots; each is only used once its statement
    /// date plus the reporting lag has passed the scoring as-of date.
    pub fn with_fundamentals(
        mut self,
        fundamentals: HashMap<String, FundamentalSnapshot>,
    ) -> Self {
        self.fundamentals = fundamentals;
        self
    }

    fn snapshot_known_at(&self, ticker: &str, as_of: NaiveDate) -> Option<&FundamentalSnapshot> {
        let snapshot = self.fundamentals.get(ticker)?;
        match snapshot.as_of {
            Some(statement_date) => {
                if statement_date + Duration::days(REPORTING_LAG_DAYS) <= as_of {
                    Some(snapshot)
                } else {
                    None
                }
            }
            // Undated snapshots are treated as always known
            None => Some(snapshot),
        }
    }

    fn index_bars(&self, as_of: NaiveDate) -> Option<Vec<Bar>> {
        match self.history.history(
            &self.index_symbol,
            as_of - Duration::days(LOOKBACK_CALENDAR_DAYS),
            as_of,
        ) {
            Ok(bars) => Some(bars),
            Err(e) => {
                tracing::debug!("no index history for market context: {e}");
                None
            }
        }
    }
}

impl ScoreProvider for CompositeScorer {
    fn score(
        &self,
        ticker: &str,
        as_of: Option<NaiveDate>,
        weights: &CategoryWeights,
    ) -> Result<StockScore, ScoringError> {
        if !weights.is_valid() {
            return Err(ScoringError::InvalidConfig(format!(
                "category weights sum to {:.3}, expected 1.0 +/- {}",
                weights.sum(),
                CategoryWeights::SUM_TOLERANCE
            )));
        }

        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
        let bars = self.history.history(
            ticker,
            as_of - Duration::days(LOOKBACK_CALENDAR_DAYS),
            as_of,
        )?;
        if bars.len() < MIN_SCORING_BARS {
            return Err(ScoringError::InsufficientData(format!(
                "{ticker}: {} bars at {as_of}, need {MIN_SCORING_BARS}",
                bars.len()
            )));
        }

        let categories = CategoryScores {
            trend_momentum: indicators::trend_momentum_score(&bars),
            volume: indicators::volume_score(&bars),
            fundamental: indicators::fundamental_score(self.snapshot_known_at(ticker, as_of)),
            market_context: self
                .index_bars(as_of)
                .map(|index| indicators::market_context_score(&index))
                .unwrap_or(0.0),
            advanced: indicators::advanced_score(&bars),
        };

        let raw = weights.blend(&categories);
        let confidence = confidence_multiplier(&categories, raw);
        let final_score = (raw / 10.0 * confidence).clamp(-10.0, 10.0);

        let veto_reasons = vetoes::apply_all(&bars, &self.veto_rules);

        Ok(StockScore {
            ticker: ticker.to_string(),
            final_score,
            confidence,
            signal: SignalLabel::from_score(final_score),
            is_vetoed: !veto_reasons.is_empty(),
            veto_reasons,
            categories,
        })
    }
}

/// Confidence multiplier from category agreement.
///
/// Strong cross-category agreement raises confidence, a 2-vs-2 split of
/// the four primary categories lowers it, and a bullish blend sitting on
/// very weak fundamentals is haircut. Clamped to [0.5, 1.5].
fn confidence_multiplier(categories: &CategoryScores, raw_score: f64) -> f64 {
    let primary = [
        categories.trend_momentum,
        categories.volume,
        categories.fundamental,
        categories.market_context,
    ];
    let positive = primary.iter().filter(|s| **s > 0.0).count();
    let negative = primary.iter().filter(|s| **s < 0.0).count();

    let mut multiplier: f64 = 1.0;
    if positive >= 3 || negative >= 3 {
        multiplier *= 1.2;
    } else if positive == 2 && negative == 2 {
        multiplier *= 0.8;
    }

    if categories.trend_momentum.abs() > 50.0 {
        multiplier *= 1.05;
    }
    if categories.fundamental < -50.0 && raw_score > 0.0 {
        multiplier *= 0.85;
    }
    if categories.advanced.abs() > 30.0 {
        let aligned = categories.advanced.signum() == raw_score.signum();
        multiplier *= if aligned { 1.10 } else { 0.90 };
    }

    multiplier.clamp(0.5, 1.5)
}
