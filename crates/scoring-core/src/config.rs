use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CategoryWeights, ScoringError};

/// Regime-specific weight overrides produced by regime optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeWeights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bull_market: Option<CategoryWeights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bear_market: Option<CategoryWeights>,
}

/// Backtest window defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    pub start_date: String,
    pub end_date: String,
    pub holding_period_days: i64,
    pub rebalance_frequency_days: i64,
    /// Annual risk-free rate as a fraction, e.g. 0.03
    pub risk_free_rate: f64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            start_date: "2018-01-01".to_string(),
            end_date: "2025-01-01".to_string(),
            holding_period_days: 60,
            rebalance_frequency_days: 30,
            risk_free_rate: 0.03,
        }
    }
}

/// File-cache settings for the market-data layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub dir: String,
    pub price_ttl_hours: u64,
    pub fundamentals_ttl_hours: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "cache".to_string(),
            price_ttl_hours: 1,
            fundamentals_ttl_hours: 24,
        }
    }
}

/// Top-level application configuration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub weights: CategoryWeights,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default = "default_index_symbol")]
    pub index_symbol: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    /// Present when regime optimization has been run and exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_weights: Option<RegimeWeights>,
}

fn default_index_symbol() -> String {
    "SPY".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            backtest: BacktestSettings::default(),
            cache: CacheSettings::default(),
            index_symbol: default_index_symbol(),
            tickers: Vec::new(),
            optimized_weights: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScoringError::InvalidConfig(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| ScoringError::InvalidConfig(format!("malformed config: {e}")))?;
        if !config.weights.is_valid() {
            return Err(ScoringError::InvalidConfig(format!(
                "category weights sum to {:.3}, expected 1.0 +/- {}",
                config.weights.sum(),
                CategoryWeights::SUM_TOLERANCE
            )));
        }
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ScoringError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| ScoringError::InvalidConfig(e.to_string()))?;
        std::fs::write(path.as_ref(), raw).map_err(|e| {
            ScoringError::InvalidConfig(format!(
                "cannot write {}: {e}",
                path.as_ref().display()
            ))
        })
    }
}
