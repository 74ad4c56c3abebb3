//! scorecast: score equities and validate the strategy historically.
//!
//! Usage:
//!   scorecast score AAPL [--as-of 2024-06-03]
//!   scorecast backtest [--start 2018-01-01 --end 2025-01-01] [--tickers AAPL,MSFT]
//!   scorecast optimize [--objective sharpe_ratio|win_rate|avg_return] [--random N]
//!   scorecast walk-forward [--train-years 2 --test-years 1]
//!   scorecast optimize-regime
//!
//! Configuration is read from scorecast.json (see --config); the data
//! provider API key comes from MARKET_DATA_API_KEY.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use anyhow::{anyhow, Context, Result};
use backtest_engine::{
    export, BacktestConfig, BacktestEngine, BacktestReport, Objective, PerformanceMetrics,
    SearchBudget, WalkForwardOptimizer, WeightOptimizer, WeightRanges,
};
use chrono::{Duration, NaiveDate};
use composite_scorer::CompositeScorer;
use market_data::{FileCache, MarketDataClient, PreloadedHistory};
use regime_classifier::{RegimeClassifier, DEFAULT_MA_PERIOD};
use scoring_core::{AppConfig, CategoryWeights, RegimeWeights};

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_VETOED: i32 = 2;
const EXIT_SELL: i32 = 3;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scorecast=info,backtest_engine=info,market_data=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(args: &[String]) -> Result<i32> {
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let config_path = flag_value(args, "--config").unwrap_or_else(|| "scorecast.json".to_string());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{e}; using built-in defaults");
            AppConfig::default()
        }
    };

    match command {
        "score" => cmd_score(args, &config).await,
        "backtest" => cmd_backtest(args, &config).await,
        "optimize" => cmd_optimize(args, &config).await,
        "walk-forward" => cmd_walk_forward(args, &config).await,
        "optimize-regime" => cmd_optimize_regime(args, &config).await,
        _ => {
            print_usage();
            Ok(EXIT_OK)
        }
    }
}

fn print_usage() {
    println!("scorecast <score|backtest|optimize|walk-forward|optimize-regime> [options]");
    println!("  score TICKER [--as-of YYYY-MM-DD]");
    println!("  backtest [--start D --end D] [--tickers A,B,C] [--out trades.csv]");
    println!("  optimize [--objective sharpe_ratio|win_rate|avg_return] [--random N]");
    println!("           [--max-evals N] [--timeout-secs N] [--out weights.json]");
    println!("  walk-forward [--train-years N --test-years N] [--out report.md]");
    println!("  optimize-regime [--out weights.json]");
}

// --- Shared setup ---

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date: {s}"))
}

fn window_from(args: &[String], config: &AppConfig) -> Result<(NaiveDate, NaiveDate)> {
    let start = flag_value(args, "--start").unwrap_or_else(|| config.backtest.start_date.clone());
    let end = flag_value(args, "--end").unwrap_or_else(|| config.backtest.end_date.clone());
    Ok((parse_date(&start)?, parse_date(&end)?))
}

fn tickers_from(args: &[String], config: &AppConfig) -> Result<Vec<String>> {
    let tickers: Vec<String> = match flag_value(args, "--tickers") {
        Some(list) => list
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect(),
        None => config.tickers.clone(),
    };
    if tickers.is_empty() {
        return Err(anyhow!(
            "no tickers: pass --tickers or set them in the config file"
        ));
    }
    Ok(tickers)
}

fn client_from(config: &AppConfig) -> Result<MarketDataClient> {
    let api_key =
        std::env::var("MARKET_DATA_API_KEY").context("MARKET_DATA_API_KEY must be set")?;
    let mut client = MarketDataClient::new(api_key);
    if config.cache.enabled {
        let cache = FileCache::new(&config.cache.dir, config.cache.price_ttl_hours)?;
        client = client.with_cache(cache, config.cache.price_ttl_hours);
    }
    Ok(client)
}

/// Fetch daily history for every symbol plus the market index. A symbol
/// that fails to fetch is logged and skipped; the run continues.
async fn preload_history(
    client: &MarketDataClient,
    config: &AppConfig,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> PreloadedHistory {
    // Indicator warm-up plus holding-period resolution on both ends
    let fetch_start = start - Duration::days(800);
    let fetch_end = end + Duration::days(config.backtest.holding_period_days + 7);

    let mut store = PreloadedHistory::new();
    let mut symbols: Vec<String> = tickers.to_vec();
    symbols.push(config.index_symbol.clone());

    for symbol in symbols {
        match client.daily_history(&symbol, fetch_start, fetch_end).await {
            Ok(bars) => {
                tracing::info!("loaded {} bars for {symbol}", bars.len());
                store.insert(symbol, bars);
            }
            Err(e) => tracing::warn!("skipping {symbol}: {e}"),
        }
    }
    store
}

fn build_engine(
    history: PreloadedHistory,
    config: &AppConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> BacktestEngine {
    let history: Arc<PreloadedHistory> = Arc::new(history);
    let scorer = Arc::new(CompositeScorer::new(
        Arc::clone(&history) as Arc<dyn scoring_core::HistoryProvider>,
        config.index_symbol.clone(),
    ));

    let mut backtest_config = BacktestConfig::new(start, end);
    backtest_config.holding_period_days = config.backtest.holding_period_days;
    backtest_config.rebalance_frequency_days = config.backtest.rebalance_frequency_days;
    backtest_config.risk_free_rate = config.backtest.risk_free_rate;

    BacktestEngine::new(scorer, history, backtest_config)
}

fn objective_from(args: &[String]) -> Result<Objective> {
    match flag_value(args, "--objective").as_deref() {
        None | Some("sharpe_ratio") => Ok(Objective::SharpeRatio),
        Some("win_rate") => Ok(Objective::WinRate),
        Some("avg_return") => Ok(Objective::AvgReturn),
        Some(other) => Err(anyhow!("unknown objective: {other}")),
    }
}

fn budget_from(args: &[String]) -> SearchBudget {
    SearchBudget {
        max_evaluations: flag_value(args, "--max-evals").and_then(|v| v.parse().ok()),
        deadline: flag_value(args, "--timeout-secs")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| Instant::now() + StdDuration::from_secs(secs)),
    }
}

// --- Commands ---

async fn cmd_score(args: &[String], config: &AppConfig) -> Result<i32> {
    let ticker = args
        .get(2)
        .filter(|t| !t.starts_with("--"))
        .map(|t| t.to_uppercase())
        .ok_or_else(|| anyhow!("usage: scorecast score TICKER [--as-of YYYY-MM-DD]"))?;
    let as_of = match flag_value(args, "--as-of") {
        Some(s) => Some(parse_date(&s)?),
        None => None,
    };

    let client = client_from(config)?;
    let end = as_of.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let history = preload_history(&client, config, &[ticker.clone()], end, end).await;

    let scorer = CompositeScorer::new(
        Arc::new(history) as Arc<dyn scoring_core::HistoryProvider>,
        config.index_symbol.clone(),
    );
    let score = scoring_core::ScoreProvider::score(&scorer, &ticker, as_of, &config.weights)?;

    println!("{}: {:+.2}  [{}]  confidence {:.2}", ticker, score.final_score, score.signal.label(), score.confidence);
    println!(
        "  trend {:+.0}  volume {:+.0}  fundamental {:+.0}  market {:+.0}  advanced {:+.0}",
        score.categories.trend_momentum,
        score.categories.volume,
        score.categories.fundamental,
        score.categories.market_context,
        score.categories.advanced,
    );
    if score.is_vetoed {
        for reason in &score.veto_reasons {
            println!("  VETO: {reason}");
        }
        return Ok(EXIT_VETOED);
    }
    if score.signal.is_sell() {
        return Ok(EXIT_SELL);
    }
    Ok(EXIT_OK)
}

fn print_backtest_summary(report: &BacktestReport, risk_free_rate: f64) {
    let metrics = PerformanceMetrics::new(&report.trades);
    let overall = metrics.overall();
    let risk = metrics.risk_adjusted(risk_free_rate);

    println!("Trades: {} ({} skipped, {} failed of {} units)", overall.total_trades, report.skipped_units, report.failed_units, report.evaluated_units);
    if overall.total_trades == 0 {
        println!("No trades were executed; check data coverage, vetoes, and the date range.");
        return;
    }
    println!("Win rate:    {:.1}%  ({} / {})", overall.win_rate_pct, overall.winners, overall.total_trades);
    println!("Avg return:  {:+.2}%   median {:+.2}%", overall.avg_return_pct, overall.median_return_pct);
    println!("Best/worst:  {:+.2}% / {:+.2}%", overall.best_trade_pct, overall.worst_trade_pct);
    println!("Sharpe {:.3}  Sortino {:.3}  Calmar {:.3}  MaxDD {:.2}%", risk.sharpe_ratio, risk.sortino_ratio, risk.calmar_ratio, risk.max_drawdown_pct);

    println!("\n{:<13} {:>7} {:>9} {:>11}", "Score range", "Trades", "Win rate", "Avg return");
    for bucket in metrics.by_score_range() {
        if bucket.metrics.total_trades == 0 {
            println!("{:<13} {:>7} {:>9} {:>11}", bucket.score_range, 0, "-", "-");
        } else {
            println!(
                "{:<13} {:>7} {:>8.1}% {:>10.2}%",
                bucket.score_range,
                bucket.metrics.total_trades,
                bucket.metrics.win_rate_pct,
                bucket.metrics.avg_return_pct
            );
        }
    }
}

async fn cmd_backtest(args: &[String], config: &AppConfig) -> Result<i32> {
    let (start, end) = window_from(args, config)?;
    let tickers = tickers_from(args, config)?;
    let client = client_from(config)?;
    let history = preload_history(&client, config, &tickers, start, end).await;
    let engine = build_engine(history, config, start, end);

    let report = engine.run_backtest(&tickers, &config.weights)?;
    print_backtest_summary(&report, config.backtest.risk_free_rate);

    let out = flag_value(args, "--out").unwrap_or_else(|| "backtest_results.csv".to_string());
    export::export_trades_csv(&report.trades, &out)?;
    println!("\ntrades written to {out}");
    Ok(EXIT_OK)
}

async fn cmd_optimize(args: &[String], config: &AppConfig) -> Result<i32> {
    let (start, end) = window_from(args, config)?;
    let tickers = tickers_from(args, config)?;
    let objective = objective_from(args)?;
    let budget = budget_from(args);

    let client = client_from(config)?;
    let history = preload_history(&client, config, &tickers, start, end).await;
    let engine = build_engine(history, config, start, end);
    let optimizer = WeightOptimizer::new(&engine);

    let ranges = WeightRanges::default();
    let result = match flag_value(args, "--random").and_then(|v| v.parse().ok()) {
        Some(n_trials) => {
            optimizer.optimize_weights_random(&tickers, &ranges, objective, n_trials, &budget)?
        }
        None => optimizer.optimize_weights(&tickers, &ranges, objective, &budget)?,
    };

    if result.used_fallback {
        println!("No valid weight combinations; keeping default weights.");
    } else {
        println!(
            "Best {}: {:.4} after {} evaluations{}",
            result.objective.key(),
            result.best_objective_score,
            result.evaluated,
            if result.truncated { " (budget hit)" } else { "" }
        );
    }
    print_weights(&result.best_weights);

    let out = flag_value(args, "--out").unwrap_or_else(|| "optimized_weights.json".to_string());
    export::export_optimized_weights(&result.best_weights, None, &out)?;
    println!("weights written to {out}");
    Ok(EXIT_OK)
}

fn print_weights(weights: &CategoryWeights) {
    for category in scoring_core::Category::ALL {
        println!("  {:<16} {:.2}", category.key(), weights.get(category));
    }
}

async fn cmd_walk_forward(args: &[String], config: &AppConfig) -> Result<i32> {
    let (start, end) = window_from(args, config)?;
    let tickers = tickers_from(args, config)?;
    let objective = objective_from(args)?;
    let budget = budget_from(args);
    let train_years: f64 = flag_value(args, "--train-years")
        .and_then(|v| v.parse().ok())
        .unwrap_or(2.0);
    let test_years: f64 = flag_value(args, "--test-years")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0);

    let client = client_from(config)?;
    let history = preload_history(&client, config, &tickers, start, end).await;
    let engine = build_engine(history, config, start, end);

    let wf = WalkForwardOptimizer::new(&engine).with_periods(train_years, test_years);
    let report = wf.run(&tickers, &WeightRanges::default(), objective, &budget)?;

    let aggregate = PerformanceMetrics::new(&report.all_test_trades);
    let overall = aggregate.overall();
    let risk = aggregate.risk_adjusted(config.backtest.risk_free_rate);
    println!(
        "Out-of-sample ({} periods): {} trades, win rate {:.1}%, avg {:+.2}%, Sharpe {:.3}",
        report.periods.len(),
        overall.total_trades,
        overall.win_rate_pct,
        overall.avg_return_pct,
        risk.sharpe_ratio
    );

    let out = flag_value(args, "--out").unwrap_or_else(|| "walk_forward_report.md".to_string());
    export::write_walk_forward_report(&report, config.backtest.risk_free_rate, &out)?;
    println!("report written to {out}");
    Ok(EXIT_OK)
}

async fn cmd_optimize_regime(args: &[String], config: &AppConfig) -> Result<i32> {
    let (start, end) = window_from(args, config)?;
    let tickers = tickers_from(args, config)?;
    let objective = objective_from(args)?;
    let budget = budget_from(args);

    let client = client_from(config)?;
    let history = preload_history(&client, config, &tickers, start, end).await;

    let index_bars = history
        .all_bars(&config.index_symbol)
        .ok_or_else(|| anyhow!("no index history for {}", config.index_symbol))?
        .to_vec();
    let classifier = RegimeClassifier::from_index_bars(&index_bars, DEFAULT_MA_PERIOD)?;
    let stats = classifier.statistics(start, end);
    println!(
        "Regimes {start}..{end}: {} bull days ({:.1}%), {} bear days ({:.1}%), {} changes",
        stats.bull_days, stats.bull_pct, stats.bear_days, stats.bear_pct, stats.regime_changes
    );

    let engine = build_engine(history, config, start, end);
    let optimizer = WeightOptimizer::new(&engine);
    let result = optimizer.optimize_by_regime_auto(
        &tickers,
        &classifier,
        &WeightRanges::default(),
        objective,
        &budget,
    )?;

    println!("Bull-market weights:");
    print_weights(&result.bull_market.best_weights);
    println!("Bear-market weights:");
    print_weights(&result.bear_market.best_weights);

    let regime_weights = RegimeWeights {
        bull_market: Some(result.bull_market.best_weights),
        bear_market: Some(result.bear_market.best_weights),
    };
    let out = flag_value(args, "--out").unwrap_or_else(|| "optimized_weights.json".to_string());
    export::export_optimized_weights(&config.weights, Some(&regime_weights), &out)?;
    println!("weights written to {out}");
    Ok(EXIT_OK)
}
