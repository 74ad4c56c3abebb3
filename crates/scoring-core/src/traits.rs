use chrono::NaiveDate;

use crate::{Bar, CategoryWeights, ScoringError, StockScore};

/// Composite scoring engine.
///
/// Implementations must be re-evaluable at arbitrary historical dates:
/// when `as_of` is given, every input (price history, fundamentals) is
/// clipped to information available at-or-before that date. Weights are
/// passed explicitly so concurrent callers can evaluate different
/// candidate vectors without shared mutable state.
pub trait ScoreProvider: Send + Sync {
    fn score(
        &self,
        ticker: &str,
        as_of: Option<NaiveDate>,
        weights: &CategoryWeights,
    ) -> Result<StockScore, ScoringError>;
}

/// Source of daily price history.
///
/// Returns bars ordered by ascending date, restricted to [start, end].
/// Safe to share read-only across parallel backtest workers.
pub trait HistoryProvider: Send + Sync {
    fn history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ScoringError>;
}
