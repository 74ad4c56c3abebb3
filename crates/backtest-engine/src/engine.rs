use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use scoring_core::{CategoryWeights, HistoryProvider, ScoreProvider, ScoringError};

use crate::models::{BacktestConfig, BacktestReport, Trade};

/// Replays the scoring strategy over a historical window and records the
/// trades that would have resulted.
///
/// Each (ticker, rebalance date) unit is independent; units are
/// evaluated on a rayon worker pool with the candidate weights passed
/// explicitly, so concurrent optimizer trials never share mutable state.
pub struct BacktestEngine {
    provider: Arc<dyn ScoreProvider>,
    history: Arc<dyn HistoryProvider>,
    config: BacktestConfig,
}

enum UnitOutcome {
    Trade(Box<Trade>),
    Skipped,
    Failed,
}

impl BacktestEngine {
    pub fn new(
        provider: Arc<dyn ScoreProvider>,
        history: Arc<dyn HistoryProvider>,
        config: BacktestConfig,
    ) -> Self {
        Self {
            provider,
            history,
            config,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// A copy of this engine scoped to a different date window; used by
    /// the optimizers for train/test sub-ranges.
    pub fn with_window(&self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            history: Arc::clone(&self.history),
            config: BacktestConfig {
                start_date,
                end_date,
                ..self.config.clone()
            },
        }
    }

    /// Rebalance dates from start to end, stepping by the configured
    /// frequency. The start date itself is always included.
    pub fn rebalance_dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.config.start_date;
        while current <= self.config.end_date {
            dates.push(current);
            current += Duration::days(self.config.rebalance_frequency_days);
        }
        dates
    }

    /// Run the backtest for `tickers` using the given category weights.
    ///
    /// Failures on individual (ticker, date) units are logged and
    /// counted, never fatal; the report always covers every unit.
    pub fn run_backtest(
        &self,
        tickers: &[String],
        weights: &CategoryWeights,
    ) -> Result<BacktestReport, ScoringError> {
        self.config.validate()?;
        if !weights.is_valid() {
            return Err(ScoringError::InvalidConfig(format!(
                "category weights sum to {:.3}, expected 1.0 +/- {}",
                weights.sum(),
                CategoryWeights::SUM_TOLERANCE
            )));
        }

        let dates = self.rebalance_dates();
        let units: Vec<(&str, NaiveDate)> = dates
            .iter()
            .flat_map(|date| tickers.iter().map(move |t| (t.as_str(), *date)))
            .collect();

        tracing::info!(
            "backtest {}..{}: {} tickers x {} rebalance dates = {} units",
            self.config.start_date,
            self.config.end_date,
            tickers.len(),
            dates.len(),
            units.len()
        );

        let outcomes: Vec<UnitOutcome> = units
            .par_iter()
            .map(|(ticker, date)| self.evaluate_unit(ticker, *date, weights))
            .collect();

        let mut report = BacktestReport {
            evaluated_units: units.len(),
            ..BacktestReport::default()
        };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Trade(trade) => report.trades.push(*trade),
                UnitOutcome::Skipped => report.skipped_units += 1,
                UnitOutcome::Failed => report.failed_units += 1,
            }
        }
        report
            .trades
            .sort_by(|a, b| (a.entry_date, &a.ticker).cmp(&(b.entry_date, &b.ticker)));

        tracing::info!(
            "backtest complete: {} trades, {} skipped, {} failed",
            report.trades.len(),
            report.skipped_units,
            report.failed_units
        );
        Ok(report)
    }

    fn evaluate_unit(
        &self,
        ticker: &str,
        entry_date: NaiveDate,
        weights: &CategoryWeights,
    ) -> UnitOutcome {
        match self.try_evaluate(ticker, entry_date, weights) {
            Ok(Some(trade)) => UnitOutcome::Trade(Box::new(trade)),
            Ok(None) => UnitOutcome::Skipped,
            Err(e) => {
                tracing::debug!("unit ({ticker}, {entry_date}) failed: {e}");
                UnitOutcome::Failed
            }
        }
    }

    /// Evaluate one (ticker, entry date) unit.
    ///
    /// `Ok(None)` means no trade: not enough warm-up history, no future
    /// bar to resolve an exit, or the score was vetoed.
    fn try_evaluate(
        &self,
        ticker: &str,
        entry_date: NaiveDate,
        weights: &CategoryWeights,
    ) -> Result<Option<Trade>, ScoringError> {
        let fetch_start = self.config.start_date - Duration::days(self.config.lookback_calendar_days);
        let fetch_end = self.config.end_date + Duration::days(self.config.holding_period_days + 7);
        let bars = self.history.history(ticker, fetch_start, fetch_end)?;

        // Bars at-or-before entry; everything after is only used to
        // resolve the exit, never to score.
        let split = bars.partition_point(|b| b.date <= entry_date);
        if split < self.config.min_history_bars {
            return Ok(None);
        }
        let entry_price = bars[split - 1].close;
        if entry_price <= 0.0 {
            return Err(ScoringError::InvalidData(format!(
                "{ticker}: non-positive close at {entry_date}"
            )));
        }

        let future = &bars[split..];
        if future.is_empty() {
            return Ok(None);
        }

        let target_exit = entry_date + Duration::days(self.config.holding_period_days);
        // First minimum wins, so an equidistant earlier bar is preferred
        let Some(exit_bar) = future
            .iter()
            .min_by_key(|b| (b.date - target_exit).num_days().abs())
        else {
            return Ok(None);
        };

        let score = self.provider.score(ticker, Some(entry_date), weights)?;
        if score.is_vetoed {
            tracing::debug!(
                "({ticker}, {entry_date}) vetoed: {}",
                score.veto_reasons.join("; ")
            );
            return Ok(None);
        }

        let return_pct = (exit_bar.close - entry_price) / entry_price * 100.0;
        Ok(Some(Trade {
            ticker: ticker.to_string(),
            entry_date,
            exit_date: exit_bar.date,
            entry_price,
            exit_price: exit_bar.close,
            score: score.final_score,
            signal: score.signal,
            confidence: score.confidence,
            return_pct,
            holding_days: (exit_bar.date - entry_date).num_days(),
        }))
    }
}
