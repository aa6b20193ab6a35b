//! In-memory series store.

use crate::domain::candle::{Candle, MarketSeries, Timeframe};
use crate::domain::error::PageError;
use crate::domain::page::TimeRange;
use crate::ports::series_port::SeriesPort;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemorySeriesAdapter {
    series: RwLock<HashMap<(String, Timeframe), MarketSeries>>,
}

impl MemorySeriesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `series`, replacing any earlier one for its symbol and timeframe.
    pub fn insert(&self, series: MarketSeries) {
        let key = (series.symbol.clone(), series.timeframe);
        self.series.write().insert(key, series);
    }

    /// Appends bars to a stored series and returns its new length. Aligned
    /// flow and funding columns are left as they are, so the new bars read
    /// as missing there.
    pub fn append(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<usize, PageError> {
        let mut store = self.series.write();
        let series = store
            .get_mut(&(symbol.to_string(), timeframe))
            .ok_or_else(|| missing(symbol, timeframe))?;
        if let (Some(last), Some(first)) = (series.candles.last(), candles.first()) {
            if first.timestamp <= last.timestamp {
                return Err(PageError::Series {
                    reason: format!(
                        "appended bar at {} does not follow {}",
                        first.timestamp, last.timestamp
                    ),
                });
            }
        }
        series.candles.extend(candles);
        Ok(series.candles.len())
    }
}

fn missing(symbol: &str, timeframe: Timeframe) -> PageError {
    PageError::Series {
        reason: format!("no series for {} {}", symbol, timeframe),
    }
}

impl SeriesPort for MemorySeriesAdapter {
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<MarketSeries, PageError> {
        let store = self.series.read();
        let series = store
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| missing(symbol, timeframe))?;
        Ok(series.between(range.start, range.end))
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .series
            .read()
            .keys()
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}
