//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: line max(fast, slow) - 1; signal and histogram
//! max(fast, slow) - 1 + signal - 1.

use crate::domain::candle::Candle;
use crate::domain::indicator::moving_average::{calculate_ema, ema_of};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(
    candles: &[Candle],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let ema_fast = calculate_ema(candles, fast);
    let ema_slow = calculate_ema(candles, slow);

    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema_of(&line, signal_period);
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

    MacdSeries {
        line,
        signal,
        histogram,
    }
}

pub fn calculate_macd_default(candles: &[Candle]) -> MacdSeries {
    calculate_macd(candles, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
