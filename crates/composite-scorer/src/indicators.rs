//! Per-category indicator scores.
//!
//! Every function takes bars already clipped to the as-of date and
//! returns a score in [-100, +100]. Missing inputs score neutral (0.0)
//! rather than erroring; the caller decides what counts as fatal.

use scoring_core::{Bar, FundamentalSnapshot};

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Simple moving average of the last `period` closes.
pub fn sma(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period || period == 0 {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(mean(&window.iter().map(|b| b.close).collect::<Vec<_>>()))
}

/// Percentage change of the close over the last `period` bars.
pub fn momentum_pct(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() <= period {
        return None;
    }
    let past = bars[bars.len() - 1 - period].close;
    let last = bars.last()?.close;
    if past <= 0.0 {
        return None;
    }
    Some((last / past - 1.0) * 100.0)
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(-100.0, 100.0)
}

/// Trend/momentum: position vs. 50/200-day MAs, MA alignment, 60-day momentum.
pub fn trend_momentum_score(bars: &[Bar]) -> f64 {
    let Some(last) = bars.last() else {
        return 0.0;
    };
    let mut score = 0.0;

    if let Some(ma50) = sma(bars, 50) {
        score += if last.close > ma50 { 25.0 } else { -25.0 };
    }
    if let Some(ma200) = sma(bars, 200) {
        score += if last.close > ma200 { 25.0 } else { -25.0 };
        if let Some(ma50) = sma(bars, 50) {
            score += if ma50 > ma200 { 15.0 } else { -15.0 };
        }
    }
    if let Some(momentum) = momentum_pct(bars, 60) {
        // +/-20% over 60 days saturates the momentum component
        score += (momentum / 20.0 * 35.0).clamp(-35.0, 35.0);
    }

    clamp_score(score)
}

/// Volume: recent 20-day volume vs. the prior 60 days, and the balance
/// of volume on up-days vs. down-days over the last 20 bars.
pub fn volume_score(bars: &[Bar]) -> f64 {
    if bars.len() < 80 {
        return 0.0;
    }
    let recent = &bars[bars.len() - 20..];
    let prior = &bars[bars.len() - 80..bars.len() - 20];

    let recent_avg = mean(&recent.iter().map(|b| b.volume).collect::<Vec<_>>());
    let prior_avg = mean(&prior.iter().map(|b| b.volume).collect::<Vec<_>>());

    let mut score = 0.0;
    let price_rising = recent.last().map(|b| b.close) >= recent.first().map(|b| b.close);
    if prior_avg > 0.0 {
        let ratio = recent_avg / prior_avg;
        // Expanding volume confirms the price direction
        let expansion = ((ratio - 1.0) / 0.5 * 50.0).clamp(-50.0, 50.0);
        score += if price_rising { expansion } else { -expansion };
    }

    let mut up_volume = 0.0;
    let mut down_volume = 0.0;
    for pair in recent.windows(2) {
        if pair[1].close > pair[0].close {
            up_volume += pair[1].volume;
        } else {
            down_volume += pair[1].volume;
        }
    }
    let total = up_volume + down_volume;
    if total > 0.0 {
        score += (up_volume - down_volume) / total * 50.0;
    }

    clamp_score(score)
}

/// Market context from broad-index bars: index vs. its 200-day MA plus
/// short-term index momentum.
pub fn market_context_score(index_bars: &[Bar]) -> f64 {
    let Some(last) = index_bars.last() else {
        return 0.0;
    };
    let mut score = 0.0;

    if let Some(ma200) = sma(index_bars, 200) {
        score += if last.close > ma200 { 60.0 } else { -60.0 };
    }
    if let Some(momentum) = momentum_pct(index_bars, 20) {
        score += (momentum / 5.0 * 40.0).clamp(-40.0, 40.0);
    }

    clamp_score(score)
}

/// Advanced signals: position within the 52-week range and the average
/// overnight gap direction over the last 10 sessions.
pub fn advanced_score(bars: &[Bar]) -> f64 {
    if bars.len() < 252 {
        return 0.0;
    }
    let year = &bars[bars.len() - 252..];
    let last_close = year.last().map(|b| b.close).unwrap_or(0.0);
    let high = year.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = year.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    let mut score = 0.0;
    if high > low {
        // 0.0 at the 52-week low, 1.0 at the high; centered to [-60, 60]
        let position = (last_close - low) / (high - low);
        score += (position - 0.5) * 120.0;
    }

    let recent = &bars[bars.len() - 10..];
    let mut gap_sum = 0.0;
    for pair in recent.windows(2) {
        if pair[0].close > 0.0 {
            gap_sum += (pair[1].open / pair[0].close - 1.0) * 100.0;
        }
    }
    score += (gap_sum / 2.0 * 40.0).clamp(-40.0, 40.0);

    clamp_score(score)
}

/// Fundamental quality from a statement snapshot. Missing fields score
/// neutral; a missing snapshot scores 0.0 overall.
pub fn fundamental_score(snapshot: Option<&FundamentalSnapshot>) -> f64 {
    let Some(snapshot) = snapshot else {
        return 0.0;
    };
    let mut score = 0.0;

    if let Some(pe) = snapshot.pe_ratio {
        score += if pe <= 0.0 {
            -30.0
        } else if pe < 15.0 {
            30.0
        } else if pe < 30.0 {
            10.0
        } else if pe < 60.0 {
            -10.0
        } else {
            -30.0
        };
    }
    if let Some(growth) = snapshot.revenue_growth {
        score += (growth / 0.20 * 30.0).clamp(-30.0, 30.0);
    }
    if let Some(margin) = snapshot.profit_margin {
        score += (margin / 0.15 * 20.0).clamp(-20.0, 20.0);
    }
    if let Some(de) = snapshot.debt_to_equity {
        score += if de < 0.5 {
            20.0
        } else if de < 1.5 {
            0.0
        } else {
            -20.0
        };
    }

    clamp_score(score)
}
