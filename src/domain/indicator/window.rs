//! Windowed price extremes.
//!
//! `HIGH_OF(n)`, `LOW_OF(n)` and `RANGE_POSITION(n, skip)` read a window that
//! EXCLUDES the current bar: at bar i, `HIGH_OF(n)` is the highest high of
//! bars `i-n ..= i-1`, so `close > HIGH_OF(n)` is a genuine breakout test.
//! `RANGE_POSITION` additionally drops the `skip` most recent completed bars,
//! reading bars `i-skip-n ..= i-skip-1`.

use crate::domain::candle::Candle;
use std::collections::VecDeque;

/// Rolling maximum of the last `period` values, current value included.
/// Warmup: period-1.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, |candidate, kept| candidate >= kept)
}

/// Rolling minimum of the last `period` values, current value included.
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, |candidate, kept| candidate <= kept)
}

/// Monotonic deque: `dominates(new, old)` evicts `old` from the back.
fn rolling_extreme(values: &[f64], period: usize, dominates: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let mut deque: VecDeque<usize> = VecDeque::with_capacity(period);
    for (i, &value) in values.iter().enumerate() {
        while let Some(&back) = deque.back() {
            if dominates(value, values[back]) {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);
        while let Some(&front) = deque.front() {
            if front + period <= i {
                deque.pop_front();
            } else {
                break;
            }
        }
        if i + 1 >= period {
            if let Some(&front) = deque.front() {
                out[i] = values[front];
            }
        }
    }
    out
}

/// Shifts an inclusive rolling window back by `lag` bars.
fn lagged(values: Vec<f64>, lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { f64::NAN })
        .collect()
}

/// Highest high of the `period` bars before the current one.
pub fn calculate_high_of(candles: &[Candle], period: usize) -> Vec<f64> {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    lagged(rolling_max(&highs, period), 1)
}

/// Lowest low of the `period` bars before the current one.
pub fn calculate_low_of(candles: &[Candle], period: usize) -> Vec<f64> {
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    lagged(rolling_min(&lows, period), 1)
}

/// Where the current close sits inside the window's high-low range, 0-100.
/// Undefined while the window is incomplete or when its range is zero.
pub fn calculate_range_position(candles: &[Candle], period: usize, skip: usize) -> Vec<f64> {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let hh = lagged(rolling_max(&highs, period), skip + 1);
    let ll = lagged(rolling_min(&lows, period), skip + 1);

    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = hh[i] - ll[i];
            if range.is_nan() || range == 0.0 {
                f64::NAN
            } else {
                (c.close - ll[i]) / range * 100.0
            }
        })
        .collect()
}
