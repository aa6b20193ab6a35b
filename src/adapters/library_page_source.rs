//! Page source backed by a series store and the indicator library.

use crate::domain::candle::{Candle, MarketSeries};
use crate::domain::config::LibraryConfig;
use crate::domain::error::PageError;
use crate::domain::indicator::Indicator;
use crate::domain::library::IndicatorLibrary;
use crate::domain::page::{Column, PageData, PageKey, PageKind, TimeRange};
use crate::ports::page_source::PageSource;
use crate::ports::series_port::SeriesPort;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct LibraryPageSource {
    series: Arc<dyn SeriesPort>,
    config: LibraryConfig,
}

impl LibraryPageSource {
    pub fn new(series: Arc<dyn SeriesPort>, config: LibraryConfig) -> Self {
        Self { series, config }
    }
}

fn candle_columns(market: &MarketSeries) -> Vec<Column> {
    let column = |name: &str, value: fn(&Candle) -> f64| Column {
        name: name.to_string(),
        values: market.candles.iter().map(value).collect(),
    };
    vec![
        column("open", |c| c.open),
        column("high", |c| c.high),
        column("low", |c| c.low),
        column("close", |c| c.close),
        column("volume", |c| c.volume),
    ]
}

fn timestamps(candles: &[Candle]) -> Vec<DateTime<Utc>> {
    candles.iter().map(|c| c.timestamp).collect()
}

impl LibraryPageSource {
    /// Computes over every bar up to the end of the range and keeps the
    /// rows inside it, so warmup matches a run over the whole series.
    fn indicator_page(
        &self,
        key: &PageKey,
        indicator: &Indicator,
    ) -> Result<PageData, PageError> {
        let range = key.range();
        let history = TimeRange::new(DateTime::<Utc>::MIN_UTC, range.end);
        let market = self.series.load(key.symbol(), key.timeframe(), &history)?;
        let first = market.candles.partition_point(|c| c.timestamp < range.start);
        let timestamps = timestamps(&market.candles[first..]);

        let library = IndicatorLibrary::new(Arc::new(market), self.config.clone());
        let columns = library
            .series(indicator)?
            .columns()
            .into_iter()
            .map(|(name, mut values)| Column {
                name: name.to_string(),
                values: values.split_off(first.min(values.len())),
            })
            .collect();
        Ok(PageData {
            timestamps,
            columns,
        })
    }
}

impl PageSource for LibraryPageSource {
    fn compute(&self, key: &PageKey) -> Result<PageData, PageError> {
        match key.kind() {
            PageKind::Candles => {
                let market = self.series.load(key.symbol(), key.timeframe(), key.range())?;
                Ok(PageData {
                    timestamps: timestamps(&market.candles),
                    columns: candle_columns(&market),
                })
            }
            PageKind::Indicator(indicator) => self.indicator_page(key, indicator),
        }
    }
}
