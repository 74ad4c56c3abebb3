use std::collections::HashMap;

use chrono::NaiveDate;
use scoring_core::{Bar, HistoryProvider, ScoringError};

/// In-memory per-ticker bar store.
///
/// Built once up front from fetched (or synthetic) history, then shared
/// read-only across parallel backtest workers.
#[derive(Debug, Default, Clone)]
pub struct PreloadedHistory {
    bars: HashMap<String, Vec<Bar>>,
}

impl PreloadedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ticker's bars, sorting by date and dropping duplicates.
    pub fn insert(&mut self, ticker: impl Into<String>, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        self.bars.insert(ticker.into(), bars);
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(|k| k.as_str())
    }

    pub fn all_bars(&self, ticker: &str) -> Option<&[Bar]> {
        self.bars.get(ticker).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl HistoryProvider for PreloadedHistory {
    fn history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ScoringError> {
        let bars = self
            .bars
            .get(ticker)
            .ok_or_else(|| ScoringError::InsufficientData(format!("no history loaded for {ticker}")))?;

        let lo = bars.partition_point(|b| b.date < start);
        let hi = bars.partition_point(|b| b.date <= end);
        if lo >= hi {
            return Err(ScoringError::InsufficientData(format!(
                "no bars for {ticker} in {start}..{end}"
            )));
        }
        Ok(bars[lo..hi].to_vec())
    }
}
