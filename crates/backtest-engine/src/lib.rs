pub mod engine;
pub mod export;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod statistical;
pub mod walk_forward;

#[cfg(test)]
mod tests;

pub use engine::BacktestEngine;
pub use metrics::{
    OverallMetrics, PerformanceMetrics, RiskMetrics, ScoreRangeMetrics, StreakMetrics,
    SCORE_BUCKETS,
};
pub use models::*;
pub use optimizer::{RegimeOptimization, WeightOptimizer};
pub use walk_forward::WalkForwardOptimizer;
