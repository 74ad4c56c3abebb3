use std::collections::BTreeMap;

use scoring_core::SignalLabel;
use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Fixed score buckets used for the per-range breakdown
pub const SCORE_BUCKETS: [(&str, f64, f64); 5] = [
    ("Strong Sell", -10.0, -6.0),
    ("Sell/Avoid", -6.0, -3.0),
    ("Neutral", -3.0, 3.0),
    ("Buy", 3.0, 6.0),
    ("Strong Buy", 6.0, 10.1),
];

/// Aggregate outcome statistics for a set of trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub total_trades: usize,
    pub winners: usize,
    pub losers: usize,
    pub win_rate_pct: f64,
    pub avg_return_pct: f64,
    pub median_return_pct: f64,
    pub avg_winner_return_pct: f64,
    pub avg_loser_return_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub avg_holding_days: f64,
}

/// Overall metrics restricted to one score bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRangeMetrics {
    pub score_range: String,
    pub min_score: f64,
    pub max_score: f64,
    pub metrics: OverallMetrics,
}

/// Risk-adjusted performance.
///
/// Annualization treats sequential non-overlapping trades as if they
/// compounded back-to-back: `trades_per_year = 365.25 / mean holding
/// days`. Max drawdown is the peak-to-trough decline of the cumulative
/// sum of per-trade returns. Any ratio with a zero denominator reports
/// 0.0 rather than NaN/inf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown_pct: f64,
    pub annualized_return_pct: f64,
    pub annualized_volatility_pct: f64,
    pub trades_per_year: f64,
}

/// Longest consecutive winning and losing runs, trades ordered by entry date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakMetrics {
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
}

/// Turns a list of trades into decision-grade statistics.
///
/// Every method is a pure function of the trade list: empty input
/// yields zeroed structs, never an error.
pub struct PerformanceMetrics<'a> {
    trades: &'a [Trade],
}

impl<'a> PerformanceMetrics<'a> {
    pub fn new(trades: &'a [Trade]) -> Self {
        Self { trades }
    }

    pub fn overall(&self) -> OverallMetrics {
        Self::overall_of(self.trades.iter())
    }

    fn overall_of(trades: impl Iterator<Item = &'a Trade>) -> OverallMetrics {
        let trades: Vec<&Trade> = trades.collect();
        if trades.is_empty() {
            return OverallMetrics::default();
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let winners: Vec<&&Trade> = trades.iter().filter(|t| t.is_winner()).collect();
        let losers_count = trades.len() - winners.len();

        let mut sorted = returns.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let loser_sum: f64 = trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.return_pct)
            .sum();

        OverallMetrics {
            total_trades: trades.len(),
            winners: winners.len(),
            losers: losers_count,
            win_rate_pct: winners.len() as f64 / trades.len() as f64 * 100.0,
            avg_return_pct: returns.iter().sum::<f64>() / returns.len() as f64,
            median_return_pct: sorted[sorted.len() / 2],
            avg_winner_return_pct: if winners.is_empty() {
                0.0
            } else {
                winners.iter().map(|t| t.return_pct).sum::<f64>() / winners.len() as f64
            },
            avg_loser_return_pct: if losers_count == 0 {
                0.0
            } else {
                loser_sum / losers_count as f64
            },
            best_trade_pct: *sorted.last().unwrap(),
            worst_trade_pct: sorted[0],
            avg_holding_days: trades.iter().map(|t| t.holding_days).sum::<i64>() as f64
                / trades.len() as f64,
        }
    }

    /// Breakdown over the fixed score buckets; empty buckets report
    /// zeroed metrics rather than being omitted.
    pub fn by_score_range(&self) -> Vec<ScoreRangeMetrics> {
        SCORE_BUCKETS
            .iter()
            .map(|(name, min_score, max_score)| ScoreRangeMetrics {
                score_range: name.to_string(),
                min_score: *min_score,
                max_score: *max_score,
                metrics: Self::overall_of(
                    self.trades
                        .iter()
                        .filter(|t| t.score >= *min_score && t.score < *max_score),
                ),
            })
            .collect()
    }

    /// Breakdown by signal label, in signal order
    pub fn by_signal(&self) -> Vec<(SignalLabel, OverallMetrics)> {
        [
            SignalLabel::StrongBuy,
            SignalLabel::Buy,
            SignalLabel::Neutral,
            SignalLabel::Sell,
            SignalLabel::StrongSell,
        ]
        .into_iter()
        .map(|signal| {
            (
                signal,
                Self::overall_of(self.trades.iter().filter(|t| t.signal == signal)),
            )
        })
        .collect()
    }

    /// Breakdown by ticker (only tickers that traded)
    pub fn by_ticker(&self) -> BTreeMap<String, OverallMetrics> {
        let mut tickers: Vec<&str> = self.trades.iter().map(|t| t.ticker.as_str()).collect();
        tickers.sort_unstable();
        tickers.dedup();

        tickers
            .into_iter()
            .map(|ticker| {
                (
                    ticker.to_string(),
                    Self::overall_of(self.trades.iter().filter(|t| t.ticker == ticker)),
                )
            })
            .collect()
    }

    /// Breakdown by entry year
    pub fn by_year(&self) -> BTreeMap<i32, OverallMetrics> {
        use chrono::Datelike;
        let mut years: Vec<i32> = self.trades.iter().map(|t| t.entry_date.year()).collect();
        years.sort_unstable();
        years.dedup();

        years
            .into_iter()
            .map(|year| {
                (
                    year,
                    Self::overall_of(self.trades.iter().filter(|t| t.entry_date.year() == year)),
                )
            })
            .collect()
    }

    pub fn risk_adjusted(&self, risk_free_rate: f64) -> RiskMetrics {
        if self.trades.is_empty() {
            return RiskMetrics::default();
        }

        let returns: Vec<f64> = self.trades.iter().map(|t| t.return_pct).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let std_dev = if returns.len() < 2 {
            0.0
        } else {
            (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };

        let mean_holding = self.trades.iter().map(|t| t.holding_days).sum::<i64>() as f64 / n;
        let trades_per_year = if mean_holding > 0.0 {
            365.25 / mean_holding
        } else {
            0.0
        };

        let annualized_return = mean * trades_per_year;
        let annualized_volatility = std_dev * trades_per_year.sqrt();
        let excess = annualized_return - risk_free_rate * 100.0;

        let sharpe_ratio = if annualized_volatility > 0.0 {
            excess / annualized_volatility
        } else {
            0.0
        };

        let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let downside_std = if negatives.len() < 2 {
            0.0
        } else {
            let neg_mean = negatives.iter().sum::<f64>() / negatives.len() as f64;
            (negatives.iter().map(|r| (r - neg_mean).powi(2)).sum::<f64>()
                / (negatives.len() as f64 - 1.0))
                .sqrt()
        };
        let annualized_downside = downside_std * trades_per_year.sqrt();
        let sortino_ratio = if annualized_downside > 0.0 {
            excess / annualized_downside
        } else {
            0.0
        };

        let max_drawdown_pct = self.max_drawdown_pct();
        let calmar_ratio = if max_drawdown_pct > 0.0 {
            annualized_return / max_drawdown_pct
        } else {
            0.0
        };

        RiskMetrics {
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown_pct,
            annualized_return_pct: annualized_return,
            annualized_volatility_pct: annualized_volatility,
            trades_per_year,
        }
    }

    /// Peak-to-trough decline of the running sum of per-trade returns,
    /// trades taken in entry-date order.
    pub fn max_drawdown_pct(&self) -> f64 {
        let mut ordered: Vec<&Trade> = self.trades.iter().collect();
        ordered.sort_by_key(|t| t.entry_date);

        let mut cumulative = 0.0;
        let mut peak = 0.0;
        let mut max_drawdown = 0.0f64;
        for trade in ordered {
            cumulative += trade.return_pct;
            if cumulative > peak {
                peak = cumulative;
            }
            max_drawdown = max_drawdown.max(peak - cumulative);
        }
        max_drawdown
    }

    pub fn streaks(&self) -> StreakMetrics {
        let mut ordered: Vec<&Trade> = self.trades.iter().collect();
        ordered.sort_by_key(|t| t.entry_date);

        let mut wins = 0;
        let mut losses = 0;
        let mut metrics = StreakMetrics::default();
        for trade in ordered {
            if trade.is_winner() {
                wins += 1;
                losses = 0;
                metrics.longest_win_streak = metrics.longest_win_streak.max(wins);
            } else {
                losses += 1;
                wins = 0;
                metrics.longest_loss_streak = metrics.longest_loss_streak.max(losses);
            }
        }
        metrics
    }
}
