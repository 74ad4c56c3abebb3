use std::time::Instant;

use chrono::NaiveDate;
use scoring_core::{CategoryWeights, ScoringError, SignalLabel};
use serde::{Deserialize, Serialize};

/// Configuration for a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Days a simulated position is held before the exit is resolved
    pub holding_period_days: i64,
    /// Days between rebalance dates
    pub rebalance_frequency_days: i64,
    /// Annual risk-free rate as a fraction, e.g. 0.03
    pub risk_free_rate: f64,
    /// Trading bars required at-or-before entry (indicator warm-up)
    pub min_history_bars: usize,
    /// Calendar days of history fetched before the window start
    pub lookback_calendar_days: i64,
}

impl BacktestConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            holding_period_days: 60,
            rebalance_frequency_days: 30,
            risk_free_rate: 0.03,
            min_history_bars: 252,
            lookback_calendar_days: 400,
        }
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.start_date > self.end_date {
            return Err(ScoringError::InvalidConfig(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.holding_period_days <= 0 || self.rebalance_frequency_days <= 0 {
            return Err(ScoringError::InvalidConfig(
                "holding period and rebalance frequency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single simulated trade, immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub score: f64,
    pub signal: SignalLabel,
    pub confidence: f64,
    pub return_pct: f64,
    pub holding_days: i64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.return_pct > 0.0
    }
}

/// Backtest output with partial-failure accounting.
///
/// A batch run always completes; units that could not produce a trade
/// are counted rather than aborting the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestReport {
    pub trades: Vec<Trade>,
    /// (ticker, date) pairs examined
    pub evaluated_units: usize,
    /// Units without enough data, without a future bar, or vetoed
    pub skipped_units: usize,
    /// Units that errored (logged and omitted)
    pub failed_units: usize,
}

/// Objective maximized by the weight search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Win rate over strong-signal trades (|score| >= 3)
    WinRate,
    /// Mean return over all trades
    AvgReturn,
    /// Sharpe ratio from the risk-adjusted metrics
    SharpeRatio,
}

impl Objective {
    pub fn key(&self) -> &'static str {
        match self {
            Objective::WinRate => "win_rate",
            Objective::AvgReturn => "avg_return",
            Objective::SharpeRatio => "sharpe_ratio",
        }
    }
}

/// Candidate weight values per category for the grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRanges {
    pub trend_momentum: Vec<f64>,
    pub volume: Vec<f64>,
    pub fundamental: Vec<f64>,
    pub market_context: Vec<f64>,
    pub advanced: Vec<f64>,
}

impl Default for WeightRanges {
    fn default() -> Self {
        Self {
            trend_momentum: vec![0.25, 0.30, 0.35],
            volume: vec![0.10, 0.15, 0.20],
            fundamental: vec![0.18, 0.22, 0.26],
            market_context: vec![0.15, 0.18, 0.21],
            advanced: vec![0.10, 0.15, 0.20],
        }
    }
}

impl WeightRanges {
    pub fn combination_count(&self) -> usize {
        self.trend_momentum.len()
            * self.volume.len()
            * self.fundamental.len()
            * self.market_context.len()
            * self.advanced.len()
    }
}

/// Bounds on a weight search. Grid searches are combinatorially
/// unbounded, so long runs can be cut off by evaluation count or
/// wall-clock deadline; the best candidate found so far still wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchBudget {
    pub max_evaluations: Option<usize>,
    pub deadline: Option<Instant>,
}

impl SearchBudget {
    pub fn exhausted(&self, evaluated: usize) -> bool {
        if let Some(max) = self.max_evaluations {
            if evaluated >= max {
                return true;
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        false
    }
}

/// Outcome of one grid or random weight search.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best_weights: CategoryWeights,
    pub best_objective_score: f64,
    pub objective: Objective,
    /// Candidates actually backtested
    pub evaluated: usize,
    /// Candidates rejected by the weight-sum filter
    pub rejected: usize,
    /// The search stopped early on its budget
    pub truncated: bool,
    /// No valid candidate existed; defaults were returned instead
    pub used_fallback: bool,
}

/// One expanding-window train/test split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardPeriod {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

impl WalkForwardPeriod {
    pub fn train_years(&self) -> f64 {
        (self.train_end - self.train_start).num_days() as f64 / 365.25
    }

    pub fn test_years(&self) -> f64 {
        (self.test_end - self.test_start).num_days() as f64 / 365.25
    }
}

/// Out-of-sample outcome of one walk-forward period.
#[derive(Debug, Clone)]
pub struct WalkForwardPeriodResult {
    pub period: WalkForwardPeriod,
    pub optimized_weights: CategoryWeights,
    pub train_objective_score: f64,
    pub test_trades: Vec<Trade>,
}

/// Aggregated walk-forward validation output. Only test-window trades
/// appear here; training trades never contribute to the estimate.
#[derive(Debug, Clone)]
pub struct WalkForwardReport {
    pub periods: Vec<WalkForwardPeriodResult>,
    pub all_test_trades: Vec<Trade>,
}
