use chrono::{Duration, NaiveDate};
use scoring_core::ScoringError;

use crate::engine::BacktestEngine;
use crate::models::{
    Objective, SearchBudget, WalkForwardPeriod, WalkForwardPeriodResult, WalkForwardReport,
    WeightRanges,
};
use crate::optimizer::WeightOptimizer;

/// Shortest test window worth evaluating, in days
const MIN_TEST_DAYS: i64 = 30;

/// Expanding-window walk-forward optimizer.
///
/// For each period, weights are tuned on the training window only and
/// then evaluated once on the following unseen test window. Training
/// data strictly grows across periods and every period's test window
/// becomes part of the next period's training window, so the aggregate
/// of test trades is an out-of-sample estimate.
pub struct WalkForwardOptimizer<'a> {
    engine: &'a BacktestEngine,
    train_period_years: f64,
    test_period_years: f64,
}

impl<'a> WalkForwardOptimizer<'a> {
    pub fn new(engine: &'a BacktestEngine) -> Self {
        Self {
            engine,
            train_period_years: 2.0,
            test_period_years: 1.0,
        }
    }

    pub fn with_periods(mut self, train_period_years: f64, test_period_years: f64) -> Self {
        self.train_period_years = train_period_years;
        self.test_period_years = test_period_years;
        self
    }

    /// Generate expanding-window train/test splits.
    ///
    /// Invariants: every period shares `train_start`; each period's
    /// `test_start` equals its `train_end`; period i+1's `train_end`
    /// equals period i's `test_end`. Generation stops once the
    /// remaining test window would be shorter than 30 days.
    pub fn generate_periods(&self, start: NaiveDate, end: NaiveDate) -> Vec<WalkForwardPeriod> {
        let mut periods = Vec::new();
        let mut train_end = start + Duration::days((365.25 * self.train_period_years) as i64);

        while train_end < end {
            let test_start = train_end;
            let mut test_end = test_start + Duration::days((365.25 * self.test_period_years) as i64);
            if test_end > end {
                test_end = end;
            }
            if (test_end - test_start).num_days() < MIN_TEST_DAYS {
                break;
            }

            periods.push(WalkForwardPeriod {
                train_start: start,
                train_end,
                test_start,
                test_end,
            });

            // Expand: the next training window absorbs this test window
            train_end = test_end;
        }

        periods
    }

    /// Run the full optimize-then-test cycle over every period.
    ///
    /// A date range too short for even one train/test split is a
    /// configuration error, not an empty success.
    pub fn run(
        &self,
        tickers: &[String],
        ranges: &WeightRanges,
        objective: Objective,
        budget: &SearchBudget,
    ) -> Result<WalkForwardReport, ScoringError> {
        let start = self.engine.config().start_date;
        let end = self.engine.config().end_date;
        let periods = self.generate_periods(start, end);

        if periods.is_empty() {
            return Err(ScoringError::InvalidConfig(format!(
                "{start}..{end} is too short for a {:.1}y train / {:.1}y test split",
                self.train_period_years, self.test_period_years
            )));
        }

        tracing::info!(
            "walk-forward: {} periods over {start}..{end} (objective: {})",
            periods.len(),
            objective.key()
        );

        let mut results = Vec::with_capacity(periods.len());
        let mut all_test_trades = Vec::new();

        for (i, period) in periods.iter().enumerate() {
            tracing::info!(
                "period {}/{}: train {}..{} ({:.1}y), test {}..{} ({:.1}y)",
                i + 1,
                periods.len(),
                period.train_start,
                period.train_end,
                period.train_years(),
                period.test_start,
                period.test_end,
                period.test_years()
            );

            let train_engine = self.engine.with_window(period.train_start, period.train_end);
            let optimization = WeightOptimizer::new(&train_engine)
                .optimize_weights(tickers, ranges, objective, budget)?;

            if optimization.used_fallback {
                tracing::warn!(
                    "period {}: no valid weight combination on training data, testing defaults",
                    i + 1
                );
            }

            let test_engine = self.engine.with_window(period.test_start, period.test_end);
            let test_report = test_engine.run_backtest(tickers, &optimization.best_weights)?;

            tracing::info!(
                "period {}: {} out-of-sample trades",
                i + 1,
                test_report.trades.len()
            );

            all_test_trades.extend(test_report.trades.iter().cloned());
            results.push(WalkForwardPeriodResult {
                period: *period,
                optimized_weights: optimization.best_weights,
                train_objective_score: optimization.best_objective_score,
                test_trades: test_report.trades,
            });
        }

        Ok(WalkForwardReport {
            periods: results,
            all_test_trades,
        })
    }
}
