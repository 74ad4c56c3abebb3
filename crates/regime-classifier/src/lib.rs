//! Bull/Bear market regime classification.
//!
//! A day is Bull when the broad-market index closes above its long
//! moving average, Bear otherwise. Days without a full moving-average
//! window carry no label at all.

use chrono::NaiveDate;
use scoring_core::{Bar, ScoringError};
use serde::{Deserialize, Serialize};

/// Default moving-average window, in trading days
pub const DEFAULT_MA_PERIOD: usize = 200;

/// Market regime label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Bull,
    Bear,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::Bull => "Bull",
            Regime::Bear => "Bear",
        }
    }
}

/// One labeled trading day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeDay {
    pub date: NaiveDate,
    pub close: f64,
    pub ma: f64,
    pub regime: Regime,
}

/// A contiguous run of days sharing one regime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimePeriod {
    pub regime: Regime,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RegimePeriod {
    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Regime breakdown over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStatistics {
    pub total_days: usize,
    pub bull_days: usize,
    pub bear_days: usize,
    pub bull_pct: f64,
    pub bear_pct: f64,
    pub regime_changes: usize,
    pub avg_regime_duration_days: f64,
}

/// Daily Bull/Bear series computed from index bars.
///
/// The series is immutable once built; refreshing the underlying index
/// history means building a new classifier, never mutating in place.
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    days: Vec<RegimeDay>,
    ma_period: usize,
}

impl RegimeClassifier {
    /// Label every index day that has a full `ma_period`-day window.
    ///
    /// Bars must be in ascending date order. The first `ma_period - 1`
    /// observations receive no label.
    pub fn from_index_bars(bars: &[Bar], ma_period: usize) -> Result<Self, ScoringError> {
        if ma_period == 0 {
            return Err(ScoringError::InvalidConfig(
                "moving-average period must be positive".to_string(),
            ));
        }
        if bars.len() < ma_period {
            return Err(ScoringError::InsufficientData(format!(
                "{} index bars, need at least {ma_period} for the moving average",
                bars.len()
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut rolling_sum: f64 = closes[..ma_period].iter().sum();
        let mut days = Vec::with_capacity(bars.len() - ma_period + 1);

        for i in (ma_period - 1)..bars.len() {
            if i >= ma_period {
                rolling_sum += closes[i] - closes[i - ma_period];
            }
            let ma = rolling_sum / ma_period as f64;
            let close = closes[i];
            days.push(RegimeDay {
                date: bars[i].date,
                close,
                ma,
                regime: if close > ma { Regime::Bull } else { Regime::Bear },
            });
        }

        tracing::debug!(
            "classified {} days ({} bull / {} bear)",
            days.len(),
            days.iter().filter(|d| d.regime == Regime::Bull).count(),
            days.iter().filter(|d| d.regime == Regime::Bear).count(),
        );

        Ok(Self { days, ma_period })
    }

    pub fn ma_period(&self) -> usize {
        self.ma_period
    }

    pub fn days(&self) -> &[RegimeDay] {
        &self.days
    }

    /// Regime for a date: exact match when the date is labeled, else the
    /// nearest labeled day. Weekend and holiday dates therefore resolve
    /// instead of failing.
    pub fn regime_for_date(&self, date: NaiveDate) -> Regime {
        let idx = self.days.partition_point(|d| d.date < date);
        if idx < self.days.len() && self.days[idx].date == date {
            return self.days[idx].regime;
        }
        let after = self.days.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.days.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (date - b.date).num_days().abs() <= (a.date - date).num_days().abs() {
                    b.regime
                } else {
                    a.regime
                }
            }
            (Some(b), None) => b.regime,
            (None, Some(a)) => a.regime,
            // Unreachable: the constructor guarantees at least one day
            (None, None) => Regime::Bear,
        }
    }

    /// Compress the daily series into contiguous (regime, start, end)
    /// runs within [start, end].
    pub fn regime_periods(&self, start: NaiveDate, end: NaiveDate) -> Vec<RegimePeriod> {
        let mut periods: Vec<RegimePeriod> = Vec::new();
        for day in self.days.iter().filter(|d| d.date >= start && d.date <= end) {
            match periods.last_mut() {
                Some(period) if period.regime == day.regime => period.end = day.date,
                _ => periods.push(RegimePeriod {
                    regime: day.regime,
                    start: day.date,
                    end: day.date,
                }),
            }
        }
        periods
    }

    /// The single longest contiguous run of `regime` within [start, end]
    pub fn longest_period(
        &self,
        regime: Regime,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<RegimePeriod> {
        self.regime_periods(start, end)
            .into_iter()
            .filter(|p| p.regime == regime)
            .max_by_key(|p| p.length_days())
    }

    /// Partition items by the regime of their entry date.
    ///
    /// Generic over the item type so trade records from other crates can
    /// be filtered without a dependency cycle.
    pub fn filter_by_regime<'a, T>(
        &self,
        items: &'a [T],
        regime: Regime,
        entry_date: impl Fn(&T) -> NaiveDate,
    ) -> Vec<&'a T> {
        items
            .iter()
            .filter(|item| self.regime_for_date(entry_date(item)) == regime)
            .collect()
    }

    pub fn statistics(&self, start: NaiveDate, end: NaiveDate) -> RegimeStatistics {
        let in_range: Vec<&RegimeDay> = self
            .days
            .iter()
            .filter(|d| d.date >= start && d.date <= end)
            .collect();

        let total_days = in_range.len();
        if total_days == 0 {
            return RegimeStatistics {
                total_days: 0,
                bull_days: 0,
                bear_days: 0,
                bull_pct: 0.0,
                bear_pct: 0.0,
                regime_changes: 0,
                avg_regime_duration_days: 0.0,
            };
        }

        let bull_days = in_range.iter().filter(|d| d.regime == Regime::Bull).count();
        let bear_days = total_days - bull_days;
        let regime_changes = in_range
            .windows(2)
            .filter(|pair| pair[0].regime != pair[1].regime)
            .count();

        RegimeStatistics {
            total_days,
            bull_days,
            bear_days,
            bull_pct: bull_days as f64 / total_days as f64 * 100.0,
            bear_pct: bear_days as f64 / total_days as f64 * 100.0,
            regime_changes,
            avg_regime_duration_days: if regime_changes > 0 {
                total_days as f64 / regime_changes as f64
            } else {
                total_days as f64
            },
        }
    }
}
