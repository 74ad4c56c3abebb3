use rand::Rng;
use regime_classifier::{Regime, RegimeClassifier};
use scoring_core::{CategoryWeights, ScoringError};

use crate::engine::BacktestEngine;
use crate::metrics::PerformanceMetrics;
use crate::models::{Objective, OptimizationResult, SearchBudget, Trade, WeightRanges};

/// Raw weight sums accepted before renormalization
const SUM_FILTER: (f64, f64) = (0.98, 1.02);

/// Strong-signal cutoff for the win-rate objective
const STRONG_SIGNAL_SCORE: f64 = 3.0;

/// Searches the category-weight space for the vector that maximizes a
/// chosen objective, using the backtest engine as its evaluation
/// function. Candidate weights travel by value into each trial, so the
/// search leaves no global state behind regardless of how it exits.
pub struct WeightOptimizer<'a> {
    engine: &'a BacktestEngine,
}

/// Per-regime optimization output
#[derive(Debug, Clone)]
pub struct RegimeOptimization {
    pub bull_market: OptimizationResult,
    pub bear_market: OptimizationResult,
}

impl<'a> WeightOptimizer<'a> {
    pub fn new(engine: &'a BacktestEngine) -> Self {
        Self { engine }
    }

    /// Cartesian-product grid search.
    ///
    /// Combinations whose raw sum falls outside [0.98, 1.02] are
    /// rejected; survivors are renormalized to sum exactly 1.0. When no
    /// combination survives, the default weights are returned with
    /// `used_fallback` set.
    pub fn optimize_weights(
        &self,
        tickers: &[String],
        ranges: &WeightRanges,
        objective: Objective,
        budget: &SearchBudget,
    ) -> Result<OptimizationResult, ScoringError> {
        let mut rejected = 0usize;
        let mut candidates = Vec::new();

        for &trend in &ranges.trend_momentum {
            for &volume in &ranges.volume {
                for &fundamental in &ranges.fundamental {
                    for &market in &ranges.market_context {
                        for &advanced in &ranges.advanced {
                            let raw = CategoryWeights {
                                trend_momentum: trend,
                                volume,
                                fundamental,
                                market_context: market,
                                advanced,
                            };
                            let sum = raw.sum();
                            if !(SUM_FILTER.0..=SUM_FILTER.1).contains(&sum) {
                                rejected += 1;
                                continue;
                            }
                            candidates.push(raw.normalized());
                        }
                    }
                }
            }
        }

        tracing::info!(
            "weight optimization ({}): {} candidates, {} rejected by sum filter",
            objective.key(),
            candidates.len(),
            rejected
        );
        self.search(tickers, candidates, objective, budget, rejected)
    }

    /// Randomized search: `n_trials` vectors sampled uniformly within
    /// each category's [min, max] range, subject to the same sum filter.
    pub fn optimize_weights_random(
        &self,
        tickers: &[String],
        ranges: &WeightRanges,
        objective: Objective,
        n_trials: usize,
        budget: &SearchBudget,
    ) -> Result<OptimizationResult, ScoringError> {
        let bounds = |values: &[f64]| -> Option<(f64, f64)> {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min <= max).then_some((min, max))
        };

        let (Some(trend), Some(volume), Some(fundamental), Some(market), Some(advanced)) = (
            bounds(&ranges.trend_momentum),
            bounds(&ranges.volume),
            bounds(&ranges.fundamental),
            bounds(&ranges.market_context),
            bounds(&ranges.advanced),
        ) else {
            return Err(ScoringError::InvalidConfig(
                "every category needs at least one candidate weight".to_string(),
            ));
        };

        let sample = |rng: &mut rand::rngs::ThreadRng, (lo, hi): (f64, f64)| -> f64 {
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        };

        let mut rng = rand::thread_rng();
        let mut rejected = 0usize;
        let mut candidates = Vec::with_capacity(n_trials);
        for _ in 0..n_trials {
            let raw = CategoryWeights {
                trend_momentum: sample(&mut rng, trend),
                volume: sample(&mut rng, volume),
                fundamental: sample(&mut rng, fundamental),
                market_context: sample(&mut rng, market),
                advanced: sample(&mut rng, advanced),
            };
            let sum = raw.sum();
            if !(SUM_FILTER.0..=SUM_FILTER.1).contains(&sum) {
                rejected += 1;
                continue;
            }
            candidates.push(raw.normalized());
        }

        tracing::info!(
            "random weight search ({}): {} of {} samples passed the sum filter",
            objective.key(),
            candidates.len(),
            n_trials
        );
        self.search(tickers, candidates, objective, budget, rejected)
    }

    fn search(
        &self,
        tickers: &[String],
        candidates: Vec<CategoryWeights>,
        objective: Objective,
        budget: &SearchBudget,
        rejected: usize,
    ) -> Result<OptimizationResult, ScoringError> {
        if candidates.is_empty() {
            tracing::warn!("no valid weight combinations; falling back to default weights");
            return Ok(OptimizationResult {
                best_weights: CategoryWeights::default(),
                best_objective_score: f64::NEG_INFINITY,
                objective,
                evaluated: 0,
                rejected,
                truncated: false,
                used_fallback: true,
            });
        }

        let mut best_weights = None;
        let mut best_score = f64::NEG_INFINITY;
        let mut evaluated = 0usize;
        let mut truncated = false;

        for weights in candidates {
            if budget.exhausted(evaluated) {
                truncated = true;
                tracing::warn!("weight search budget exhausted after {evaluated} evaluations");
                break;
            }

            let report = self.engine.run_backtest(tickers, &weights)?;
            let score = self.objective_score(&report.trades, objective);
            evaluated += 1;

            if score > best_score {
                best_score = score;
                best_weights = Some(weights);
            }
        }

        match best_weights {
            Some(weights) => Ok(OptimizationResult {
                best_weights: weights,
                best_objective_score: best_score,
                objective,
                evaluated,
                rejected,
                truncated,
                used_fallback: false,
            }),
            None => Ok(OptimizationResult {
                best_weights: CategoryWeights::default(),
                best_objective_score: f64::NEG_INFINITY,
                objective,
                evaluated,
                rejected,
                truncated,
                used_fallback: true,
            }),
        }
    }

    fn objective_score(&self, trades: &[Trade], objective: Objective) -> f64 {
        match objective {
            Objective::WinRate => {
                let strong: Vec<&Trade> = trades
                    .iter()
                    .filter(|t| t.score.abs() >= STRONG_SIGNAL_SCORE)
                    .collect();
                if strong.is_empty() {
                    0.0
                } else {
                    let winners = strong.iter().filter(|t| t.is_winner()).count();
                    winners as f64 / strong.len() as f64 * 100.0
                }
            }
            Objective::AvgReturn => {
                if trades.is_empty() {
                    0.0
                } else {
                    trades.iter().map(|t| t.return_pct).sum::<f64>() / trades.len() as f64
                }
            }
            Objective::SharpeRatio => PerformanceMetrics::new(trades)
                .risk_adjusted(self.engine.config().risk_free_rate)
                .sharpe_ratio,
        }
    }

    /// Regime-aware optimization: find the single longest contiguous
    /// Bull and Bear periods in the training window and run the grid
    /// search independently on each. A regime with no contiguous period
    /// falls back to the default weights.
    pub fn optimize_by_regime_auto(
        &self,
        tickers: &[String],
        classifier: &RegimeClassifier,
        ranges: &WeightRanges,
        objective: Objective,
        budget: &SearchBudget,
    ) -> Result<RegimeOptimization, ScoringError> {
        let start = self.engine.config().start_date;
        let end = self.engine.config().end_date;

        let optimize_regime = |regime: Regime| -> Result<OptimizationResult, ScoringError> {
            match classifier.longest_period(regime, start, end) {
                Some(period) => {
                    tracing::info!(
                        "optimizing {} weights on longest {} period {}..{}",
                        objective.key(),
                        regime.name(),
                        period.start,
                        period.end
                    );
                    let scoped = self.engine.with_window(period.start, period.end);
                    WeightOptimizer::new(&scoped).optimize_weights(
                        tickers, ranges, objective, budget,
                    )
                }
                None => {
                    tracing::warn!(
                        "no contiguous {} period in {start}..{end}; using default weights",
                        regime.name()
                    );
                    Ok(OptimizationResult {
                        best_weights: CategoryWeights::default(),
                        best_objective_score: f64::NEG_INFINITY,
                        objective,
                        evaluated: 0,
                        rejected: 0,
                        truncated: false,
                        used_fallback: true,
                    })
                }
            }
        };

        Ok(RegimeOptimization {
            bull_market: optimize_regime(Regime::Bull)?,
            bear_market: optimize_regime(Regime::Bear)?,
        })
    }
}
