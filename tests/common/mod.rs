#![allow(dead_code)]

use chrono::{TimeZone, Utc};
pub use signalforge::domain::candle::{Candle, MarketSeries, Timeframe};
use signalforge::domain::config::LibraryConfig;
use signalforge::domain::library::IndicatorLibrary;
use std::sync::Arc;

pub const BASE_TS: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

pub fn candle(index: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp: Utc.timestamp_opt(BASE_TS + index as i64 * 3600, 0).unwrap(),
        open,
        high,
        low,
        close,
        volume,
        trade_count: None,
        taker_buy_volume: None,
    }
}

/// Hourly candles with open = high = low = close.
pub fn flat_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| candle(i, close, close, close, close, 1000.0))
        .collect()
}

/// Hourly candles with a one-point range around each close.
pub fn ranged_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| candle(i, close, close + 1.0, close - 1.0, close, 1000.0))
        .collect()
}

pub fn market(symbol: &str, candles: Vec<Candle>) -> MarketSeries {
    MarketSeries::new(symbol, Timeframe::H1, candles)
}

pub fn library(closes: &[f64]) -> IndicatorLibrary {
    IndicatorLibrary::new(
        Arc::new(market("TEST", flat_candles(closes))),
        LibraryConfig::default(),
    )
}
