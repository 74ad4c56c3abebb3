//! Hard veto rules.
//!
//! A veto disqualifies a ticker from trading regardless of its computed
//! score. Each check returns a reason string when it fires.

use scoring_core::Bar;
use serde::{Deserialize, Serialize};

use crate::indicators::mean;

/// Thresholds for the automatic veto rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VetoRules {
    /// Minimum last close; anything below is penny-stock territory
    pub min_price: f64,
    /// Minimum average daily dollar volume over the last 20 sessions
    pub min_avg_dollar_volume: f64,
    /// Maximum tolerated 60-session decline, as a fraction (0.40 = 40%)
    pub max_decline_60d: f64,
}

impl Default for VetoRules {
    fn default() -> Self {
        Self {
            min_price: 5.0,
            min_avg_dollar_volume: 5_000_000.0,
            max_decline_60d: 0.40,
        }
    }
}

pub fn check_liquidity(bars: &[Bar], rules: &VetoRules) -> Option<String> {
    if bars.len() < 20 {
        return None;
    }
    let recent = &bars[bars.len() - 20..];
    let dollar_volume = mean(
        &recent
            .iter()
            .map(|b| b.close * b.volume)
            .collect::<Vec<_>>(),
    );
    if dollar_volume < rules.min_avg_dollar_volume {
        return Some(format!(
            "Insufficient liquidity: avg dollar volume ${:.0} < ${:.0}",
            dollar_volume, rules.min_avg_dollar_volume
        ));
    }
    None
}

pub fn check_price_floor(bars: &[Bar], rules: &VetoRules) -> Option<String> {
    let last = bars.last()?;
    if last.close < rules.min_price {
        return Some(format!(
            "Penny stock: price ${:.2} < ${:.2}",
            last.close, rules.min_price
        ));
    }
    None
}

pub fn check_falling_knife(bars: &[Bar], rules: &VetoRules) -> Option<String> {
    if bars.len() < 61 {
        return None;
    }
    let past = bars[bars.len() - 61].close;
    let last = bars[bars.len() - 1].close;
    if past <= 0.0 {
        return None;
    }
    let decline = 1.0 - last / past;
    if decline > rules.max_decline_60d {
        return Some(format!(
            "Falling knife: price down {:.1}% in 60 sessions (> {:.0}%)",
            decline * 100.0,
            rules.max_decline_60d * 100.0
        ));
    }
    None
}

/// Run every veto rule and collect the reasons that fired.
pub fn apply_all(bars: &[Bar], rules: &VetoRules) -> Vec<String> {
    [
        check_liquidity(bars, rules),
        check_price_floor(bars, rules),
        check_falling_knife(bars, rules),
    ]
    .into_iter()
    .flatten()
    .collect()
}
