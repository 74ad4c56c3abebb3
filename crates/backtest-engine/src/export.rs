//! Result exports: trades CSV, optimized-weights JSON, and the
//! walk-forward validation report.

use std::fmt::Write as _;
use std::path::Path;

use scoring_core::{CategoryWeights, RegimeWeights, ScoringError};

use crate::metrics::PerformanceMetrics;
use crate::models::{Trade, WalkForwardReport};
use crate::statistical::{
    calculate_confidence_interval, test_mean_return_significance, test_win_rate_significance,
    DEFAULT_BOOTSTRAP_SAMPLES,
};

fn io_err(path: &Path, e: impl std::fmt::Display) -> ScoringError {
    ScoringError::Io(format!("{}: {e}", path.display()))
}

/// Write one row per trade.
pub fn export_trades_csv(trades: &[Trade], path: impl AsRef<Path>) -> Result<(), ScoringError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| io_err(path, e))?;

    writer
        .write_record([
            "Ticker",
            "Entry Date",
            "Exit Date",
            "Entry Price",
            "Exit Price",
            "Score",
            "Signal",
            "Confidence",
            "Return %",
            "Holding Days",
        ])
        .map_err(|e| io_err(path, e))?;

    for trade in trades {
        writer
            .write_record([
                trade.ticker.clone(),
                trade.entry_date.to_string(),
                trade.exit_date.to_string(),
                format!("{:.4}", trade.entry_price),
                format!("{:.4}", trade.exit_price),
                format!("{:.2}", trade.score),
                trade.signal.label().to_string(),
                format!("{:.2}", trade.confidence),
                format!("{:.4}", trade.return_pct),
                trade.holding_days.to_string(),
            ])
            .map_err(|e| io_err(path, e))?;
    }
    writer.flush().map_err(|e| io_err(path, e))?;
    tracing::info!("exported {} trades to {}", trades.len(), path.display());
    Ok(())
}

/// Write optimized weights, with optional regime sub-sections, as JSON.
pub fn export_optimized_weights(
    weights: &CategoryWeights,
    regime: Option<&RegimeWeights>,
    path: impl AsRef<Path>,
) -> Result<(), ScoringError> {
    let path = path.as_ref();
    let mut document = serde_json::json!({ "weights": weights });
    if let Some(regime) = regime {
        if let Some(bull) = &regime.bull_market {
            document["bull_market"] = serde_json::json!(bull);
        }
        if let Some(bear) = &regime.bear_market {
            document["bear_market"] = serde_json::json!(bear);
        }
    }
    let raw = serde_json::to_string_pretty(&document)
        .map_err(|e| ScoringError::Calculation(e.to_string()))?;
    std::fs::write(path, raw).map_err(|e| io_err(path, e))?;
    tracing::info!("exported optimized weights to {}", path.display());
    Ok(())
}

/// Render the walk-forward validation report as markdown: one row per
/// test period, an aggregate row, and the statistical validation of the
/// pooled out-of-sample trades.
pub fn walk_forward_report_markdown(report: &WalkForwardReport, risk_free_rate: f64) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "# Walk-Forward Validation Report");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Out-of-Sample Periods");
    let _ = writeln!(doc);
    let _ = writeln!(
        doc,
        "| Period | Test Range | Trades | Win Rate | Avg Return | Sharpe | Max DD |"
    );
    let _ = writeln!(
        doc,
        "|--------|------------|--------|----------|------------|--------|--------|"
    );

    for (i, period_result) in report.periods.iter().enumerate() {
        let metrics = PerformanceMetrics::new(&period_result.test_trades);
        let overall = metrics.overall();
        let risk = metrics.risk_adjusted(risk_free_rate);
        let _ = writeln!(
            doc,
            "| {} | {} to {} | {} | {:.1}% | {:+.2}% | {:.3} | {:.2}% |",
            i + 1,
            period_result.period.test_start,
            period_result.period.test_end,
            overall.total_trades,
            overall.win_rate_pct,
            overall.avg_return_pct,
            risk.sharpe_ratio,
            risk.max_drawdown_pct,
        );
    }

    let aggregate = PerformanceMetrics::new(&report.all_test_trades);
    let overall = aggregate.overall();
    let risk = aggregate.risk_adjusted(risk_free_rate);
    let _ = writeln!(
        doc,
        "| ALL | Aggregated (out-of-sample) | {} | {:.1}% | {:+.2}% | {:.3} | {:.2}% |",
        overall.total_trades,
        overall.win_rate_pct,
        overall.avg_return_pct,
        risk.sharpe_ratio,
        risk.max_drawdown_pct,
    );

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Aggregated Risk-Adjusted Metrics");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "- **Sharpe Ratio:** {:.3}", risk.sharpe_ratio);
    let _ = writeln!(doc, "- **Sortino Ratio:** {:.3}", risk.sortino_ratio);
    let _ = writeln!(doc, "- **Calmar Ratio:** {:.3}", risk.calmar_ratio);
    let _ = writeln!(doc, "- **Max Drawdown:** {:.2}%", risk.max_drawdown_pct);
    let _ = writeln!(
        doc,
        "- **Annualized Return:** {:+.2}%",
        risk.annualized_return_pct
    );
    let _ = writeln!(
        doc,
        "- **Annualized Volatility:** {:.2}%",
        risk.annualized_volatility_pct
    );

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Statistical Validation");
    let _ = writeln!(doc);

    let returns: Vec<f64> = report.all_test_trades.iter().map(|t| t.return_pct).collect();
    let winners = report.all_test_trades.iter().filter(|t| t.is_winner()).count();

    let win_test = test_win_rate_significance(winners, report.all_test_trades.len(), 0.50);
    let _ = writeln!(doc, "### Win Rate Significance");
    let _ = writeln!(doc, "- **p-value:** {:.4}", win_test.p_value);
    let _ = writeln!(
        doc,
        "- **Significant:** {}",
        if win_test.is_significant { "Yes" } else { "No" }
    );
    let _ = writeln!(doc, "- **Conclusion:** {}", win_test.conclusion);
    let _ = writeln!(doc);

    let return_test = test_mean_return_significance(&returns, 0.0);
    let _ = writeln!(doc, "### Mean Return Significance");
    let _ = writeln!(doc, "- **p-value:** {:.4}", return_test.p_value);
    let _ = writeln!(
        doc,
        "- **Significant:** {}",
        if return_test.is_significant { "Yes" } else { "No" }
    );
    let _ = writeln!(doc, "- **Conclusion:** {}", return_test.conclusion);
    let _ = writeln!(doc);

    let ci = calculate_confidence_interval(&returns, 0.95, DEFAULT_BOOTSTRAP_SAMPLES);
    let _ = writeln!(doc, "### 95% Confidence Interval for Mean Return");
    let _ = writeln!(
        doc,
        "- **Mean:** {:+.2}%  |  **95% CI:** [{:+.2}%, {:+.2}%]",
        ci.mean, ci.lower, ci.upper
    );

    doc
}

pub fn write_walk_forward_report(
    report: &WalkForwardReport,
    risk_free_rate: f64,
    path: impl AsRef<Path>,
) -> Result<(), ScoringError> {
    let path = path.as_ref();
    let doc = walk_forward_report_markdown(report, risk_free_rate);
    std::fs::write(path, doc).map_err(|e| io_err(path, e))?;
    tracing::info!("walk-forward report written to {}", path.display());
    Ok(())
}
