//! Market series store port trait.

use crate::domain::candle::{MarketSeries, Timeframe};
use crate::domain::error::PageError;
use crate::domain::page::TimeRange;

/// Supplies the bound series for a symbol and timeframe. Called from
/// page workers, so implementations must be shareable across threads.
pub trait SeriesPort: Send + Sync {
    /// Bars whose timestamps fall in `range`, oldest first.
    fn load(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<MarketSeries, PageError>;

    fn symbols(&self) -> Vec<String>;
}
