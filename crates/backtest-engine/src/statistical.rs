//! Statistical validation of backtest results.
//!
//! Point estimates from a backtest say nothing about whether the edge
//! is distinguishable from chance; these tests quantify that. Every
//! function special-cases degenerate input and returns a labeled
//! "insufficient data" result instead of panicking.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, ContinuousCDF, Discrete, StudentsT};

/// Two-sided significance threshold
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Default bootstrap resamples for confidence intervals
pub const DEFAULT_BOOTSTRAP_SAMPLES: usize = 10_000;

/// Default Monte Carlo simulation count
pub const DEFAULT_SIMULATIONS: usize = 1_000;

/// Binomial test of the observed win rate against a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinRateTest {
    pub win_rate: f64,
    pub baseline: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub conclusion: String,
    pub n_winners: usize,
    pub n_total: usize,
}

/// Two-sided exact binomial test of `n_winners` successes in `n_total`
/// trials against `baseline` success probability.
pub fn test_win_rate_significance(
    n_winners: usize,
    n_total: usize,
    baseline: f64,
) -> WinRateTest {
    if n_total == 0 || n_winners > n_total {
        return WinRateTest {
            win_rate: 0.0,
            baseline,
            p_value: 1.0,
            is_significant: false,
            conclusion: "No trades to test".to_string(),
            n_winners,
            n_total,
        };
    }

    let win_rate = n_winners as f64 / n_total as f64;
    let p_value = binomial_two_sided_p(n_winners as u64, n_total as u64, baseline);
    let is_significant = p_value < SIGNIFICANCE_LEVEL;

    let conclusion = if is_significant {
        if win_rate > baseline {
            format!(
                "Win rate ({:.1}%) is significantly BETTER than {:.1}%",
                win_rate * 100.0,
                baseline * 100.0
            )
        } else {
            format!(
                "Win rate ({:.1}%) is significantly WORSE than {:.1}%",
                win_rate * 100.0,
                baseline * 100.0
            )
        }
    } else {
        format!(
            "Win rate ({:.1}%) is NOT significantly different from {:.1}%",
            win_rate * 100.0,
            baseline * 100.0
        )
    };

    WinRateTest {
        win_rate,
        baseline,
        p_value,
        is_significant,
        conclusion,
        n_winners,
        n_total,
    }
}

/// Exact two-sided binomial p-value: the summed probability of every
/// outcome at most as likely as the observed one.
fn binomial_two_sided_p(observed: u64, n: u64, p: f64) -> f64 {
    let Ok(dist) = Binomial::new(p, n) else {
        return 1.0;
    };
    let observed_pmf = dist.pmf(observed);
    let cutoff = observed_pmf * (1.0 + 1e-7);
    let p_value: f64 = (0..=n)
        .map(|k| dist.pmf(k))
        .filter(|pmf| *pmf <= cutoff)
        .sum();
    p_value.min(1.0)
}

/// One-sample t-test of mean return against a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanReturnTest {
    pub mean_return: f64,
    pub baseline: f64,
    pub p_value: f64,
    pub t_statistic: f64,
    pub is_significant: bool,
    pub conclusion: String,
    pub n_trades: usize,
}

pub fn test_mean_return_significance(returns: &[f64], baseline: f64) -> MeanReturnTest {
    if returns.len() < 2 {
        return MeanReturnTest {
            mean_return: 0.0,
            baseline,
            p_value: 1.0,
            t_statistic: 0.0,
            is_significant: false,
            conclusion: "Insufficient data for t-test".to_string(),
            n_trades: returns.len(),
        };
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std_dev = sample_std(returns, mean);

    if std_dev <= f64::EPSILON {
        return MeanReturnTest {
            mean_return: mean,
            baseline,
            p_value: 1.0,
            t_statistic: 0.0,
            is_significant: false,
            conclusion: "Insufficient data for t-test (zero variance)".to_string(),
            n_trades: returns.len(),
        };
    }

    let t_statistic = (mean - baseline) / (std_dev / n.sqrt());
    let p_value = t_two_tailed_p(t_statistic, n - 1.0);
    let is_significant = p_value < SIGNIFICANCE_LEVEL;

    let conclusion = if is_significant {
        if mean > baseline {
            format!("Mean return ({mean:+.2}%) is significantly BETTER than {baseline:+.2}%")
        } else {
            format!("Mean return ({mean:+.2}%) is significantly WORSE than {baseline:+.2}%")
        }
    } else {
        format!("Mean return ({mean:+.2}%) is NOT significantly different from {baseline:+.2}%")
    };

    MeanReturnTest {
        mean_return: mean,
        baseline,
        p_value,
        t_statistic,
        is_significant,
        conclusion,
        n_trades: returns.len(),
    }
}

/// Two-sample comparison of independent return populations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub strategy_a_name: String,
    pub strategy_b_name: String,
    pub mean_a: f64,
    pub mean_b: f64,
    pub std_a: f64,
    pub std_b: f64,
    pub n_a: usize,
    pub n_b: usize,
    pub t_statistic: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub conclusion: String,
}

/// Unpaired two-sample t-test (pooled variance).
pub fn compare_strategies(
    returns_a: &[f64],
    returns_b: &[f64],
    name_a: &str,
    name_b: &str,
) -> StrategyComparison {
    let n_a = returns_a.len();
    let n_b = returns_b.len();
    let insufficient = |mean_a: f64, mean_b: f64| StrategyComparison {
        strategy_a_name: name_a.to_string(),
        strategy_b_name: name_b.to_string(),
        mean_a,
        mean_b,
        std_a: 0.0,
        std_b: 0.0,
        n_a,
        n_b,
        t_statistic: 0.0,
        p_value: 1.0,
        is_significant: false,
        conclusion: "Insufficient data for comparison".to_string(),
    };

    if n_a == 0 || n_b == 0 || n_a + n_b < 3 {
        return insufficient(0.0, 0.0);
    }

    let mean_a = returns_a.iter().sum::<f64>() / n_a as f64;
    let mean_b = returns_b.iter().sum::<f64>() / n_b as f64;
    let std_a = sample_std(returns_a, mean_a);
    let std_b = sample_std(returns_b, mean_b);

    let df = (n_a + n_b - 2) as f64;
    let pooled_var = ((n_a as f64 - 1.0) * std_a * std_a + (n_b as f64 - 1.0) * std_b * std_b) / df;
    let pooled_std = pooled_var.sqrt();
    let scale = (1.0 / n_a as f64 + 1.0 / n_b as f64).sqrt();

    let (t_statistic, p_value) = if pooled_std <= f64::EPSILON {
        if (mean_a - mean_b).abs() <= f64::EPSILON {
            (0.0, 1.0)
        } else {
            (f64::INFINITY * (mean_a - mean_b).signum(), 0.0)
        }
    } else {
        let t = (mean_a - mean_b) / (pooled_std * scale);
        (t, t_two_tailed_p(t, df))
    };

    let is_significant = p_value < SIGNIFICANCE_LEVEL;
    let conclusion = if is_significant {
        if mean_a > mean_b {
            format!("{name_a} ({mean_a:+.2}%) significantly OUTPERFORMS {name_b} ({mean_b:+.2}%)")
        } else {
            format!("{name_b} ({mean_b:+.2}%) significantly OUTPERFORMS {name_a} ({mean_a:+.2}%)")
        }
    } else {
        format!("No significant difference between {name_a} ({mean_a:+.2}%) and {name_b} ({mean_b:+.2}%)")
    };

    StrategyComparison {
        strategy_a_name: name_a.to_string(),
        strategy_b_name: name_b.to_string(),
        mean_a,
        mean_b,
        std_a,
        std_b,
        n_a,
        n_b,
        t_statistic,
        p_value,
        is_significant,
        conclusion,
    }
}

/// Bull vs. Bear performance comparison.
pub fn compare_regime_performance(
    bull_returns: &[f64],
    bear_returns: &[f64],
) -> StrategyComparison {
    compare_strategies(bull_returns, bear_returns, "Bull Market", "Bear Market")
}

/// Paired t-test of index-aligned return lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedComparison {
    pub before_name: String,
    pub after_name: String,
    pub mean_before: f64,
    pub mean_after: f64,
    pub mean_difference: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub conclusion: String,
    pub n_pairs: usize,
}

pub fn paired_comparison(
    before: &[f64],
    after: &[f64],
    before_name: &str,
    after_name: &str,
) -> PairedComparison {
    let invalid = |conclusion: &str| PairedComparison {
        before_name: before_name.to_string(),
        after_name: after_name.to_string(),
        mean_before: 0.0,
        mean_after: 0.0,
        mean_difference: 0.0,
        t_statistic: 0.0,
        p_value: 1.0,
        is_significant: false,
        conclusion: conclusion.to_string(),
        n_pairs: 0,
    };

    if before.is_empty() || after.is_empty() || before.len() != after.len() {
        return invalid("Invalid data for paired comparison (must be same length)");
    }
    if before.len() < 2 {
        return invalid("Insufficient data for paired comparison");
    }

    let n = before.len() as f64;
    let diffs: Vec<f64> = after.iter().zip(before).map(|(a, b)| a - b).collect();
    let mean_before = before.iter().sum::<f64>() / n;
    let mean_after = after.iter().sum::<f64>() / n;
    let mean_difference = diffs.iter().sum::<f64>() / n;
    let diff_std = sample_std(&diffs, mean_difference);

    let (t_statistic, p_value) = if diff_std <= f64::EPSILON {
        if mean_difference.abs() <= f64::EPSILON {
            (0.0, 1.0)
        } else {
            (f64::INFINITY * mean_difference.signum(), 0.0)
        }
    } else {
        let t = mean_difference / (diff_std / n.sqrt());
        (t, t_two_tailed_p(t, n - 1.0))
    };

    let is_significant = p_value < SIGNIFICANCE_LEVEL;
    let conclusion = if is_significant {
        if mean_difference > 0.0 {
            format!("{after_name} ({mean_after:+.2}%) significantly BETTER than {before_name} ({mean_before:+.2}%)")
        } else {
            format!("{after_name} ({mean_after:+.2}%) significantly WORSE than {before_name} ({mean_before:+.2}%)")
        }
    } else {
        format!("No significant difference between {after_name} and {before_name}")
    };

    PairedComparison {
        before_name: before_name.to_string(),
        after_name: after_name.to_string(),
        mean_before,
        mean_after,
        mean_difference,
        t_statistic,
        p_value,
        is_significant,
        conclusion,
        n_pairs: before.len(),
    }
}

/// Bootstrap percentile confidence interval for the mean return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    pub confidence: f64,
    pub n_bootstrap: usize,
}

/// Nonparametric bootstrap of the mean: resample with replacement
/// `n_bootstrap` times and take the percentile interval.
pub fn calculate_confidence_interval(
    returns: &[f64],
    confidence: f64,
    n_bootstrap: usize,
) -> ConfidenceInterval {
    if returns.is_empty() || n_bootstrap == 0 {
        return ConfidenceInterval {
            mean: 0.0,
            lower: 0.0,
            upper: 0.0,
            confidence,
            n_bootstrap,
        };
    }

    let n = returns.len();
    let mean = returns.iter().sum::<f64>() / n as f64;

    let mut bootstrap_means: Vec<f64> = (0..n_bootstrap)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            let total: f64 = (0..n).map(|_| returns[rng.gen_range(0..n)]).sum();
            total / n as f64
        })
        .collect();
    bootstrap_means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let alpha = 1.0 - confidence;
    ConfidenceInterval {
        mean,
        lower: percentile_sorted(&bootstrap_means, alpha / 2.0 * 100.0),
        upper: percentile_sorted(&bootstrap_means, (1.0 - alpha / 2.0) * 100.0),
        confidence,
        n_bootstrap,
    }
}

/// Distribution of summed simulated return sequences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub mean_simulated_return: f64,
    pub median_simulated_return: f64,
    pub std_simulated_return: f64,
    pub pct_positive_outcomes: f64,
    pub worst_case: f64,
    pub best_case: f64,
    pub percentile_5: f64,
    pub percentile_95: f64,
    pub n_simulations: usize,
}

/// Resample observed per-trade returns with replacement into simulated
/// multi-trade sequences and summarize the distribution of the summed
/// return. Bounds how much of the observed result plain variance could
/// explain.
pub fn monte_carlo_simulation(
    returns: &[f64],
    n_simulations: usize,
    n_trades_per_sim: Option<usize>,
) -> MonteCarloSummary {
    if returns.is_empty() || n_simulations == 0 {
        return MonteCarloSummary::default();
    }

    let n_trades = n_trades_per_sim.unwrap_or(returns.len());
    let mut totals: Vec<f64> = (0..n_simulations)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            (0..n_trades)
                .map(|_| returns[rng.gen_range(0..returns.len())])
                .sum()
        })
        .collect();
    totals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = totals.len() as f64;
    let mean = totals.iter().sum::<f64>() / n;
    let variance = totals.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    let positive = totals.iter().filter(|t| **t > 0.0).count();

    MonteCarloSummary {
        mean_simulated_return: mean,
        median_simulated_return: percentile_sorted(&totals, 50.0),
        std_simulated_return: variance.sqrt(),
        pct_positive_outcomes: positive as f64 / n * 100.0,
        worst_case: totals[0],
        best_case: *totals.last().unwrap(),
        percentile_5: percentile_sorted(&totals, 5.0),
        percentile_95: percentile_sorted(&totals, 95.0),
        n_simulations,
    }
}

// --- Helpers ---

fn sample_std(data: &[f64], mean: f64) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let variance =
        data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() as f64 - 1.0);
    variance.sqrt()
}

fn t_two_tailed_p(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
