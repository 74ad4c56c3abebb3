use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use market_data::PreloadedHistory;
use regime_classifier::{Regime, RegimeClassifier};
use scoring_core::{
    Bar, CategoryScores, CategoryWeights, ScoreProvider, ScoringError, SignalLabel, StockScore,
};

use crate::engine::BacktestEngine;
use crate::export;
use crate::metrics::{OverallMetrics, PerformanceMetrics};
use crate::models::*;
use crate::optimizer::WeightOptimizer;
use crate::statistical;
use crate::walk_forward::WalkForwardOptimizer;

/// Helper: parse a YYYY-MM-DD date.
fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Helper: flat bar around the given close.
fn bar(day: NaiveDate, close: f64) -> Bar {
    Bar {
        date: day,
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 1_000_000.0,
    }
}

/// Helper: consecutive calendar-daily bars with closes from `price_at`.
fn daily_bars(start: &str, count: usize, price_at: impl Fn(usize) -> f64) -> Vec<Bar> {
    (0..count)
        .map(|i| bar(date(start) + Duration::days(i as i64), price_at(i)))
        .collect()
}

fn history_of(entries: Vec<(&str, Vec<Bar>)>) -> Arc<PreloadedHistory> {
    let mut store = PreloadedHistory::new();
    for (ticker, bars) in entries {
        store.insert(ticker, bars);
    }
    Arc::new(store)
}

/// Score provider stub with a fixed score and veto flag.
struct StubScorer {
    score: f64,
    vetoed: bool,
}

impl StubScorer {
    fn scoring(score: f64) -> Self {
        Self {
            score,
            vetoed: false,
        }
    }

    fn vetoing() -> Self {
        Self {
            score: 5.0,
            vetoed: true,
        }
    }
}

impl ScoreProvider for StubScorer {
    fn score(
        &self,
        ticker: &str,
        _as_of: Option<NaiveDate>,
        _weights: &CategoryWeights,
    ) -> Result<StockScore, ScoringError> {
        Ok(StockScore {
            ticker: ticker.to_string(),
            final_score: self.score,
            confidence: 1.0,
            signal: SignalLabel::from_score(self.score),
            is_vetoed: self.vetoed,
            veto_reasons: if self.vetoed {
                vec!["stubbed veto".to_string()]
            } else {
                Vec::new()
            },
            categories: CategoryScores::default(),
        })
    }
}

/// Score provider stub that always errors.
struct FailingScorer;

impl ScoreProvider for FailingScorer {
    fn score(
        &self,
        _ticker: &str,
        _as_of: Option<NaiveDate>,
        _weights: &CategoryWeights,
    ) -> Result<StockScore, ScoringError> {
        Err(ScoringError::Calculation("stubbed failure".to_string()))
    }
}

/// Stub whose signal strength depends on the trend weight, so the
/// optimizer has something real to find.
struct WeightSensitiveScorer;

impl ScoreProvider for WeightSensitiveScorer {
    fn score(
        &self,
        ticker: &str,
        _as_of: Option<NaiveDate>,
        weights: &CategoryWeights,
    ) -> Result<StockScore, ScoringError> {
        let score = if weights.trend_momentum >= 0.30 { 5.0 } else { 1.0 };
        Ok(StockScore {
            ticker: ticker.to_string(),
            final_score: score,
            confidence: 1.0,
            signal: SignalLabel::from_score(score),
            is_vetoed: false,
            veto_reasons: Vec::new(),
            categories: CategoryScores::default(),
        })
    }
}

/// Helper: build a trade record directly for metrics tests.
fn trade(ticker: &str, entry: &str, return_pct: f64, score: f64) -> Trade {
    let entry_date = date(entry);
    Trade {
        ticker: ticker.to_string(),
        entry_date,
        exit_date: entry_date + Duration::days(60),
        entry_price: 100.0,
        exit_price: 100.0 * (1.0 + return_pct / 100.0),
        score,
        signal: SignalLabel::from_score(score),
        confidence: 1.0,
        return_pct,
        holding_days: 60,
    }
}

fn engine_over(
    provider: Arc<dyn ScoreProvider>,
    history: Arc<PreloadedHistory>,
    start: &str,
    end: &str,
) -> BacktestEngine {
    BacktestEngine::new(provider, history, BacktestConfig::new(date(start), date(end)))
}

// =============================================================================
// Backtest engine
// =============================================================================

#[test]
fn test_known_rise_produces_ten_percent_trade() {
    // 300 flat bars at 100 ending on the entry date, one future bar 60
    // days later at 110: exactly one trade returning ~10%.
    let entry = "2024-01-02";
    let mut bars = daily_bars("2023-03-09", 300, |_| 100.0);
    assert_eq!(bars.last().unwrap().date, date(entry));
    bars.push(bar(date(entry) + Duration::days(60), 110.0));

    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        entry,
        entry,
    );
    let report = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert!((trade.return_pct - 10.0).abs() < 1e-9);
    assert_eq!(trade.entry_price, 100.0);
    assert_eq!(trade.exit_price, 110.0);
    assert_eq!(trade.holding_days, 60);
    assert_eq!(trade.score, 5.0);
    assert_eq!(trade.signal, SignalLabel::Buy);
    assert!(trade.exit_date > trade.entry_date);
}

#[test]
fn test_vetoed_provider_yields_zero_trades() {
    let mut bars = daily_bars("2022-01-01", 900, |i| 100.0 + i as f64 * 0.1);
    bars.sort_by_key(|b| b.date);

    let engine = engine_over(
        Arc::new(StubScorer::vetoing()),
        history_of(vec![("AAPL", bars)]),
        "2023-06-01",
        "2023-12-01",
    );
    let report = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.skipped_units, report.evaluated_units);
    assert_eq!(report.failed_units, 0);
}

#[test]
fn test_insufficient_warmup_skips_unit() {
    // Only 100 bars before the entry date: below the 252-bar warm-up
    let bars = daily_bars("2023-10-01", 200, |_| 100.0);
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        "2024-01-08",
        "2024-01-08",
    );
    let report = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.skipped_units, 1);
}

#[test]
fn test_unit_failures_are_counted_not_fatal() {
    let bars = daily_bars("2022-01-01", 900, |_| 100.0);
    let engine = engine_over(
        Arc::new(FailingScorer),
        history_of(vec![("AAPL", bars)]),
        "2023-06-01",
        "2023-09-01",
    );
    let report = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.failed_units, report.evaluated_units);
}

#[test]
fn test_missing_ticker_counts_as_failed_without_aborting() {
    let bars = daily_bars("2022-01-01", 900, |_| 100.0);
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        "2023-06-01",
        "2023-08-01",
    );
    let report = engine
        .run_backtest(
            &["AAPL".to_string(), "MISSING".to_string()],
            &CategoryWeights::default(),
        )
        .unwrap();

    // The loaded ticker still trades; the missing one just fails per unit
    assert!(!report.trades.is_empty());
    assert!(report.failed_units > 0);
    assert!(report.trades.iter().all(|t| t.ticker == "AAPL"));
}

#[test]
fn test_all_trades_satisfy_date_invariants() {
    let bars = daily_bars("2021-01-01", 1200, |i| 50.0 + (i as f64 * 0.05));
    let engine = engine_over(
        Arc::new(StubScorer::scoring(4.0)),
        history_of(vec![("MSFT", bars)]),
        "2023-01-01",
        "2023-12-01",
    );
    let report = engine
        .run_backtest(&["MSFT".to_string()], &CategoryWeights::default())
        .unwrap();

    assert!(!report.trades.is_empty());
    for trade in &report.trades {
        assert!(trade.exit_date > trade.entry_date);
        assert!(trade.holding_days >= 0);
        assert!(trade.entry_price > 0.0);
    }
}

#[test]
fn test_exit_tie_resolves_to_earlier_bar() {
    let entry = "2024-01-02";
    let mut bars = daily_bars("2023-03-09", 300, |_| 100.0);
    // Two future bars equidistant from the +60d target: day 59 and 61
    bars.push(bar(date(entry) + Duration::days(59), 105.0));
    bars.push(bar(date(entry) + Duration::days(61), 120.0));

    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        entry,
        entry,
    );
    let report = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].exit_price, 105.0);
    assert_eq!(report.trades[0].holding_days, 59);
}

#[test]
fn test_invalid_weights_are_a_config_error() {
    let bars = daily_bars("2022-01-01", 900, |_| 100.0);
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        "2023-06-01",
        "2023-08-01",
    );
    let mut weights = CategoryWeights::default();
    weights.trend_momentum = 0.60;
    let err = engine
        .run_backtest(&["AAPL".to_string()], &weights)
        .unwrap_err();
    assert!(matches!(err, ScoringError::InvalidConfig(_)));
}

#[test]
fn test_reversed_date_range_is_a_config_error() {
    let bars = daily_bars("2022-01-01", 900, |_| 100.0);
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        "2023-08-01",
        "2023-06-01",
    );
    let err = engine
        .run_backtest(&["AAPL".to_string()], &CategoryWeights::default())
        .unwrap_err();
    assert!(matches!(err, ScoringError::InvalidConfig(_)));
}

#[test]
fn test_rebalance_dates_step_by_frequency() {
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![]),
        "2024-01-01",
        "2024-03-01",
    );
    let dates = engine.rebalance_dates();
    assert_eq!(dates.len(), 3);
    assert_eq!(dates[0], date("2024-01-01"));
    assert_eq!(dates[1], date("2024-01-31"));
    assert_eq!(dates[2], date("2024-03-01"));
}

// =============================================================================
// Performance metrics
// =============================================================================

/// Ten trades: five +5% then five -1%, in entry-date order.
fn five_and_five() -> Vec<Trade> {
    (0..10)
        .map(|i| {
            let day = format!("2023-01-{:02}", i + 1);
            let ret = if i < 5 { 5.0 } else { -1.0 };
            trade("AAPL", &day, ret, 5.0)
        })
        .collect()
}

#[test]
fn test_overall_metrics_on_known_distribution() {
    let trades = five_and_five();
    let overall = PerformanceMetrics::new(&trades).overall();

    assert_eq!(overall.total_trades, 10);
    assert_eq!(overall.winners, 5);
    assert_eq!(overall.losers, 5);
    assert!((overall.win_rate_pct - 50.0).abs() < 1e-9);
    assert!((overall.avg_return_pct - 2.0).abs() < 1e-9);
    assert!((overall.avg_winner_return_pct - 5.0).abs() < 1e-9);
    assert!((overall.avg_loser_return_pct - (-1.0)).abs() < 1e-9);
    assert_eq!(overall.best_trade_pct, 5.0);
    assert_eq!(overall.worst_trade_pct, -1.0);
}

#[test]
fn test_streaks_on_known_distribution() {
    let trades = five_and_five();
    let streaks = PerformanceMetrics::new(&trades).streaks();
    assert_eq!(streaks.longest_win_streak, 5);
    assert_eq!(streaks.longest_loss_streak, 5);
}

#[test]
fn test_win_loss_identity() {
    let trades = five_and_five();
    let overall = PerformanceMetrics::new(&trades).overall();
    assert_eq!(overall.winners + overall.losers, overall.total_trades);
    assert!(
        (overall.win_rate_pct
            - 100.0 * overall.winners as f64 / overall.total_trades as f64)
            .abs()
            < 1e-9
    );
}

#[test]
fn test_empty_trades_report_zeroed_metrics() {
    let trades: Vec<Trade> = Vec::new();
    let metrics = PerformanceMetrics::new(&trades);

    assert_eq!(metrics.overall(), OverallMetrics::default());
    assert_eq!(metrics.risk_adjusted(0.03), crate::metrics::RiskMetrics::default());
    assert_eq!(metrics.streaks().longest_win_streak, 0);
    assert!(metrics.by_ticker().is_empty());
    assert!(metrics.by_year().is_empty());
    // Score buckets still report all five ranges, zeroed
    let buckets = metrics.by_score_range();
    assert_eq!(buckets.len(), 5);
    assert!(buckets.iter().all(|b| b.metrics.total_trades == 0));
}

#[test]
fn test_score_range_metrics_idempotent() {
    let trades = vec![
        trade("A", "2023-01-01", 4.0, -8.0),
        trade("A", "2023-02-01", -2.0, -4.5),
        trade("A", "2023-03-01", 1.0, 0.0),
        trade("A", "2023-04-01", 3.0, 4.0),
        trade("A", "2023-05-01", 8.0, 7.5),
        trade("A", "2023-06-01", 2.0, 10.0),
    ];
    let metrics = PerformanceMetrics::new(&trades);
    let first = metrics.by_score_range();
    let second = metrics.by_score_range();
    assert_eq!(first, second);

    // Bucket membership: [min, max) per range, score 10.0 lands in Strong Buy
    let strong_buy = first.iter().find(|b| b.score_range == "Strong Buy").unwrap();
    assert_eq!(strong_buy.metrics.total_trades, 2);
    let neutral = first.iter().find(|b| b.score_range == "Neutral").unwrap();
    assert_eq!(neutral.metrics.total_trades, 1);
}

#[test]
fn test_risk_adjusted_metrics_formulas() {
    let trades = vec![
        trade("A", "2023-01-01", 10.0, 5.0),
        trade("A", "2023-02-01", -5.0, 5.0),
        trade("A", "2023-03-01", 10.0, 5.0),
        trade("A", "2023-04-01", -5.0, 5.0),
    ];
    let risk = PerformanceMetrics::new(&trades).risk_adjusted(0.03);

    let trades_per_year = 365.25 / 60.0;
    assert!((risk.trades_per_year - trades_per_year).abs() < 1e-9);
    assert!((risk.annualized_return_pct - 2.5 * trades_per_year).abs() < 1e-9);
    assert!(risk.annualized_volatility_pct > 0.0);
    assert!(risk.sharpe_ratio > 0.0);

    // Cumulative sum path: 10, 5, 15, 10 -> max peak-to-trough = 5
    assert!((risk.max_drawdown_pct - 5.0).abs() < 1e-9);
    assert!((risk.calmar_ratio - risk.annualized_return_pct / 5.0).abs() < 1e-9);
}

#[test]
fn test_zero_denominators_report_zero_not_nan() {
    // One trade: zero volatility, zero drawdown
    let trades = vec![trade("A", "2023-01-01", 5.0, 5.0)];
    let risk = PerformanceMetrics::new(&trades).risk_adjusted(0.03);
    assert_eq!(risk.sharpe_ratio, 0.0);
    assert_eq!(risk.sortino_ratio, 0.0);
    assert_eq!(risk.calmar_ratio, 0.0);
    assert!(risk.annualized_return_pct.is_finite());
}

#[test]
fn test_annual_breakdown_groups_by_entry_year() {
    let trades = vec![
        trade("A", "2020-06-01", 5.0, 5.0),
        trade("A", "2020-09-01", -1.0, 5.0),
        trade("A", "2021-02-01", 3.0, 5.0),
    ];
    let by_year = PerformanceMetrics::new(&trades).by_year();
    assert_eq!(by_year.len(), 2);
    assert_eq!(by_year[&2020].total_trades, 2);
    assert_eq!(by_year[&2021].total_trades, 1);
}

#[test]
fn test_ticker_and_signal_breakdowns() {
    let trades = vec![
        trade("AAPL", "2023-01-01", 5.0, 7.0),
        trade("AAPL", "2023-02-01", -1.0, 7.0),
        trade("MSFT", "2023-01-01", 2.0, 4.0),
    ];
    let metrics = PerformanceMetrics::new(&trades);

    let by_ticker = metrics.by_ticker();
    assert_eq!(by_ticker["AAPL"].total_trades, 2);
    assert_eq!(by_ticker["MSFT"].total_trades, 1);

    let by_signal = metrics.by_signal();
    let strong_buy = by_signal
        .iter()
        .find(|(s, _)| *s == SignalLabel::StrongBuy)
        .unwrap();
    assert_eq!(strong_buy.1.total_trades, 2);
    let buy = by_signal.iter().find(|(s, _)| *s == SignalLabel::Buy).unwrap();
    assert_eq!(buy.1.total_trades, 1);
}

// =============================================================================
// Weight optimizer
// =============================================================================

fn optimizer_fixture(provider: Arc<dyn ScoreProvider>) -> (Arc<PreloadedHistory>, BacktestEngine) {
    let mut bars = daily_bars("2022-01-01", 800, |i| 100.0 + i as f64 * 0.1);
    bars.push(bar(
        bars.last().unwrap().date + Duration::days(60),
        bars.last().unwrap().close * 1.1,
    ));
    let history = history_of(vec![("AAPL", bars)]);
    let engine = BacktestEngine::new(
        provider,
        Arc::clone(&history) as Arc<dyn scoring_core::HistoryProvider>,
        BacktestConfig::new(date("2023-06-01"), date("2023-06-01")),
    );
    (history, engine)
}

#[test]
fn test_all_combinations_outside_tolerance_fall_back_to_defaults() {
    let (_history, engine) = optimizer_fixture(Arc::new(StubScorer::scoring(5.0)));
    let optimizer = WeightOptimizer::new(&engine);

    // Every combination sums to 1.50: nothing survives the filter
    let ranges = WeightRanges {
        trend_momentum: vec![0.50],
        volume: vec![0.25],
        fundamental: vec![0.25],
        market_context: vec![0.25],
        advanced: vec![0.25],
    };
    let result = optimizer
        .optimize_weights(
            &["AAPL".to_string()],
            &ranges,
            Objective::WinRate,
            &SearchBudget::default(),
        )
        .unwrap();

    assert!(result.used_fallback);
    assert_eq!(result.evaluated, 0);
    assert_eq!(result.rejected, 1);
    assert_eq!(result.best_weights, CategoryWeights::default());
}

#[test]
fn test_grid_search_finds_the_better_trend_weight() {
    let (_history, engine) = optimizer_fixture(Arc::new(WeightSensitiveScorer));
    let optimizer = WeightOptimizer::new(&engine);

    // Two candidates: raw sums 0.98 and 1.02, both inside the filter.
    // After renormalization the trend weights are ~0.286 and ~0.314;
    // only the latter clears the stub's 0.30 threshold for strong signals.
    let ranges = WeightRanges {
        trend_momentum: vec![0.28, 0.32],
        volume: vec![0.15],
        fundamental: vec![0.22],
        market_context: vec![0.18],
        advanced: vec![0.15],
    };
    let result = optimizer
        .optimize_weights(
            &["AAPL".to_string()],
            &ranges,
            Objective::WinRate,
            &SearchBudget::default(),
        )
        .unwrap();

    assert!(!result.used_fallback);
    assert_eq!(result.evaluated, 2);
    assert!(result.best_weights.trend_momentum > 0.30);
    assert!((result.best_objective_score - 100.0).abs() < 1e-9);
}

#[test]
fn test_optimizer_output_weights_are_renormalized() {
    let (_history, engine) = optimizer_fixture(Arc::new(StubScorer::scoring(5.0)));
    let optimizer = WeightOptimizer::new(&engine);

    let result = optimizer
        .optimize_weights(
            &["AAPL".to_string()],
            &WeightRanges::default(),
            Objective::AvgReturn,
            &SearchBudget {
                max_evaluations: Some(10),
                deadline: None,
            },
        )
        .unwrap();

    assert!((result.best_weights.sum() - 1.0).abs() < 1e-6);
}

#[test]
fn test_search_budget_truncates_the_grid() {
    let (_history, engine) = optimizer_fixture(Arc::new(StubScorer::scoring(5.0)));
    let optimizer = WeightOptimizer::new(&engine);

    let result = optimizer
        .optimize_weights(
            &["AAPL".to_string()],
            &WeightRanges::default(),
            Objective::AvgReturn,
            &SearchBudget {
                max_evaluations: Some(3),
                deadline: None,
            },
        )
        .unwrap();

    assert!(result.truncated);
    assert_eq!(result.evaluated, 3);
    assert!(!result.used_fallback);
}

#[test]
fn test_random_search_respects_sum_filter() {
    let (_history, engine) = optimizer_fixture(Arc::new(StubScorer::scoring(5.0)));
    let optimizer = WeightOptimizer::new(&engine);

    let result = optimizer
        .optimize_weights_random(
            &["AAPL".to_string()],
            &WeightRanges::default(),
            Objective::AvgReturn,
            50,
            &SearchBudget {
                max_evaluations: Some(10),
                deadline: None,
            },
        )
        .unwrap();

    if !result.used_fallback {
        assert!((result.best_weights.sum() - 1.0).abs() < 1e-6);
    }
    assert!(result.evaluated + result.rejected <= 50);
}

#[test]
fn test_regime_auto_falls_back_when_a_regime_is_absent() {
    let (_history, engine) = optimizer_fixture(Arc::new(StubScorer::scoring(5.0)));

    // Monotonically rising index: every labeled day is Bull
    let index_bars = daily_bars("2022-06-01", 500, |i| 100.0 + i as f64);
    let classifier = RegimeClassifier::from_index_bars(&index_bars, 200).unwrap();

    let scoped = engine.with_window(date("2023-06-01"), date("2023-12-01"));
    let optimizer = WeightOptimizer::new(&scoped);
    let ranges = WeightRanges {
        trend_momentum: vec![0.30],
        volume: vec![0.15],
        fundamental: vec![0.22],
        market_context: vec![0.18],
        advanced: vec![0.15],
    };
    let result = optimizer
        .optimize_by_regime_auto(
            &["AAPL".to_string()],
            &classifier,
            &ranges,
            Objective::AvgReturn,
            &SearchBudget::default(),
        )
        .unwrap();

    assert!(!result.bull_market.used_fallback);
    assert!(result.bear_market.used_fallback);
    assert_eq!(result.bear_market.best_weights, CategoryWeights::default());
}

// =============================================================================
// Walk-forward optimization
// =============================================================================

#[test]
fn test_generate_periods_expanding_window_invariants() {
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![]),
        "2018-01-01",
        "2025-01-01",
    );
    let wf = WalkForwardOptimizer::new(&engine);
    let periods = wf.generate_periods(date("2018-01-01"), date("2025-01-01"));

    assert!(periods.len() >= 4);
    for period in &periods {
        // Shared origin and adjacency within each split
        assert_eq!(period.train_start, date("2018-01-01"));
        assert_eq!(period.test_start, period.train_end);
        assert!((period.test_end - period.test_start).num_days() >= 30);
        assert!(period.test_end <= date("2025-01-01"));
    }
    for pair in periods.windows(2) {
        assert_eq!(pair[1].train_end, pair[0].test_end);
        assert_eq!(pair[1].train_start, pair[0].train_start);
    }
}

#[test]
fn test_walk_forward_rejects_too_short_range() {
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![]),
        "2018-01-01",
        "2018-06-01",
    );
    let wf = WalkForwardOptimizer::new(&engine);
    let err = wf
        .run(
            &["AAPL".to_string()],
            &WeightRanges::default(),
            Objective::SharpeRatio,
            &SearchBudget::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ScoringError::InvalidConfig(_)));
}

#[test]
fn test_walk_forward_aggregates_only_test_trades() {
    let bars = daily_bars("2016-01-01", 2000, |i| 50.0 + i as f64 * 0.05);
    let engine = engine_over(
        Arc::new(StubScorer::scoring(5.0)),
        history_of(vec![("AAPL", bars)]),
        "2018-01-01",
        "2021-01-01",
    );
    let wf = WalkForwardOptimizer::new(&engine);
    let single_candidate = WeightRanges {
        trend_momentum: vec![0.30],
        volume: vec![0.15],
        fundamental: vec![0.22],
        market_context: vec![0.18],
        advanced: vec![0.15],
    };
    let report = wf
        .run(
            &["AAPL".to_string()],
            &single_candidate,
            Objective::AvgReturn,
            &SearchBudget::default(),
        )
        .unwrap();

    assert!(!report.periods.is_empty());
    let per_period_total: usize = report.periods.iter().map(|p| p.test_trades.len()).sum();
    assert_eq!(report.all_test_trades.len(), per_period_total);
    assert!(!report.all_test_trades.is_empty());

    // Every aggregated trade entered inside its period's test window
    for period_result in &report.periods {
        for trade in &period_result.test_trades {
            assert!(trade.entry_date >= period_result.period.test_start);
            assert!(trade.entry_date <= period_result.period.test_end);
        }
        assert!((period_result.optimized_weights.sum() - 1.0).abs() < 1e-6);
    }
}

// =============================================================================
// Statistical validation
// =============================================================================

#[test]
fn test_nine_of_ten_wins_is_significant() {
    let result = statistical::test_win_rate_significance(9, 10, 0.50);
    assert!(result.p_value < 0.05);
    assert!(result.is_significant);
    assert!(result.conclusion.contains("BETTER"));
}

#[test]
fn test_even_split_is_not_significant() {
    let result = statistical::test_win_rate_significance(5, 10, 0.50);
    assert!(!result.is_significant);
    assert!(result.p_value > 0.5);
}

#[test]
fn test_zero_trades_win_rate_reports_no_data() {
    let result = statistical::test_win_rate_significance(0, 0, 0.50);
    assert!(!result.is_significant);
    assert_eq!(result.p_value, 1.0);
    assert_eq!(result.conclusion, "No trades to test");
}

#[test]
fn test_mean_return_degenerate_inputs_never_raise() {
    for returns in [vec![], vec![5.0]] {
        let result = statistical::test_mean_return_significance(&returns, 0.0);
        assert!(!result.is_significant);
        assert!(result.conclusion.contains("Insufficient data"));
    }
}

#[test]
fn test_consistent_positive_returns_are_significant() {
    let returns = vec![2.0, 2.1, 1.9, 2.05, 1.95, 2.2, 1.8, 2.0, 2.1, 1.9];
    let result = statistical::test_mean_return_significance(&returns, 0.0);
    assert!(result.is_significant);
    assert!(result.conclusion.contains("BETTER"));
    assert!(result.t_statistic > 0.0);
}

#[test]
fn test_compare_strategies_detects_obvious_gap() {
    let a: Vec<f64> = (0..12).map(|i| 5.0 + (i % 3) as f64 * 0.1).collect();
    let b: Vec<f64> = (0..12).map(|i| -5.0 - (i % 3) as f64 * 0.1).collect();
    let result = statistical::compare_strategies(&a, &b, "Adaptive", "Static");
    assert!(result.is_significant);
    assert!(result.conclusion.contains("OUTPERFORMS"));
    assert!(result.mean_a > result.mean_b);
}

#[test]
fn test_compare_strategies_empty_population_is_insufficient() {
    let result = statistical::compare_strategies(&[], &[1.0, 2.0], "A", "B");
    assert!(!result.is_significant);
    assert!(result.conclusion.contains("Insufficient data"));
}

#[test]
fn test_regime_comparison_labels_populations() {
    let bull = vec![3.0, 4.0, 5.0, 3.5, 4.5];
    let bear = vec![-1.0, -2.0, 0.5, -1.5, -0.5];
    let result = statistical::compare_regime_performance(&bull, &bear);
    assert_eq!(result.strategy_a_name, "Bull Market");
    assert_eq!(result.strategy_b_name, "Bear Market");
}

#[test]
fn test_paired_comparison_rejects_mismatched_lengths() {
    let result = statistical::paired_comparison(&[1.0, 2.0, 3.0], &[1.0, 2.0], "Before", "After");
    assert!(!result.is_significant);
    assert!(result.conclusion.contains("Invalid data"));
    assert_eq!(result.n_pairs, 0);
}

#[test]
fn test_paired_comparison_detects_consistent_improvement() {
    let before = vec![1.0, 1.5, 0.5, 2.0, 1.2, 0.8];
    let after: Vec<f64> = before.iter().map(|r| r + 1.0).collect();
    let result = statistical::paired_comparison(&before, &after, "Before", "After");
    assert!((result.mean_difference - 1.0).abs() < 1e-9);
    assert!(result.is_significant);
    assert!(result.conclusion.contains("BETTER"));
}

#[test]
fn test_bootstrap_interval_brackets_the_mean() {
    let returns: Vec<f64> = (1..=20).map(|i| i as f64 / 10.0).collect();
    let ci = statistical::calculate_confidence_interval(&returns, 0.95, 2000);
    assert!(ci.lower <= ci.mean);
    assert!(ci.mean <= ci.upper);
    assert!(ci.lower > 0.0);
}

#[test]
fn test_bootstrap_empty_returns_zeroed_interval() {
    let ci = statistical::calculate_confidence_interval(&[], 0.95, 1000);
    assert_eq!(ci.mean, 0.0);
    assert_eq!(ci.lower, 0.0);
    assert_eq!(ci.upper, 0.0);
}

#[test]
fn test_monte_carlo_on_constant_returns_is_degenerate() {
    let returns = vec![1.0; 8];
    let summary = statistical::monte_carlo_simulation(&returns, 500, None);
    assert_eq!(summary.pct_positive_outcomes, 100.0);
    assert!((summary.worst_case - 8.0).abs() < 1e-9);
    assert!((summary.best_case - 8.0).abs() < 1e-9);
    assert!((summary.mean_simulated_return - 8.0).abs() < 1e-9);
}

#[test]
fn test_monte_carlo_empty_input_is_zeroed() {
    let summary = statistical::monte_carlo_simulation(&[], 500, None);
    assert_eq!(summary.n_simulations, 0);
    assert_eq!(summary.mean_simulated_return, 0.0);
}

#[test]
fn test_monte_carlo_percentiles_are_ordered() {
    let returns = vec![5.0, -3.0, 2.0, -1.0, 4.0, 0.5, -2.5, 3.0];
    let summary = statistical::monte_carlo_simulation(&returns, 2000, Some(20));
    assert!(summary.worst_case <= summary.percentile_5);
    assert!(summary.percentile_5 <= summary.median_simulated_return);
    assert!(summary.median_simulated_return <= summary.percentile_95);
    assert!(summary.percentile_95 <= summary.best_case);
}

// =============================================================================
// Regime partitioning of trades
// =============================================================================

#[test]
fn test_trades_partition_cleanly_by_regime() {
    // Index rises, crashes below its MA, then stays depressed
    let mut closes: Vec<f64> = (0..300).map(|i| 100.0 + i as f64).collect();
    closes.extend([80.0; 200]);
    let index_bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| bar(date("2022-01-01") + Duration::days(i as i64), *c))
        .collect();
    let classifier = RegimeClassifier::from_index_bars(&index_bars, 200).unwrap();

    let trades = vec![
        trade("A", "2022-09-01", 5.0, 5.0),
        trade("A", "2022-11-15", -2.0, 5.0),
        trade("A", "2023-03-01", 1.0, 5.0),
        trade("A", "2023-05-01", -1.0, 5.0),
    ];

    let bull = classifier.filter_by_regime(&trades, Regime::Bull, |t| t.entry_date);
    let bear = classifier.filter_by_regime(&trades, Regime::Bear, |t| t.entry_date);
    assert_eq!(bull.len() + bear.len(), trades.len());
    assert!(!bear.is_empty());
}

// =============================================================================
// Exports
// =============================================================================

#[test]
fn test_csv_export_writes_one_row_per_trade() {
    let trades = five_and_five();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backtest_results.csv");
    export::export_trades_csv(&trades, &path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), trades.len() + 1);
    assert!(lines[0].starts_with("Ticker,Entry Date,Exit Date"));
    assert!(lines[1].contains("AAPL"));
}

#[test]
fn test_weights_export_with_regime_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("optimized_weights.json");
    let regime = scoring_core::RegimeWeights {
        bull_market: Some(CategoryWeights::default()),
        bear_market: Some(CategoryWeights::default()),
    };
    export::export_optimized_weights(&CategoryWeights::default(), Some(&regime), &path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(document.get("weights").is_some());
    assert!(document.get("bull_market").is_some());
    assert!(document.get("bear_market").is_some());
    assert!(document["weights"].get("trend_momentum").is_some());
}

#[test]
fn test_walk_forward_report_contains_aggregate_row() {
    let period = WalkForwardPeriod {
        train_start: date("2018-01-01"),
        train_end: date("2020-01-01"),
        test_start: date("2020-01-01"),
        test_end: date("2021-01-01"),
    };
    let report = WalkForwardReport {
        periods: vec![WalkForwardPeriodResult {
            period,
            optimized_weights: CategoryWeights::default(),
            train_objective_score: 1.0,
            test_trades: five_and_five(),
        }],
        all_test_trades: five_and_five(),
    };

    let doc = export::walk_forward_report_markdown(&report, 0.03);
    assert!(doc.contains("| ALL | Aggregated (out-of-sample) |"));
    assert!(doc.contains("Statistical Validation"));
    assert!(doc.contains("2020-01-01 to 2021-01-01"));
}
