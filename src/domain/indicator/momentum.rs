//! Momentum oscillators: RSI, ROC and the stochastic oscillator.
//!
//! RSI uses Wilder's smoothing for average gain/loss:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); 100 when avg_loss == 0.
//! Warmup: first n bars (n price changes are needed for the first average).

use crate::domain::candle::Candle;
use crate::domain::indicator::moving_average::sma_of;
use crate::domain::indicator::window::{rolling_max, rolling_min};

pub fn calculate_rsi(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() <= period {
        return values;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = candles[i].close - candles[i - 1].close;
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    values[period] = rsi_from(avg_gain, avg_loss);

    for i in (period + 1)..candles.len() {
        let change = candles[i].close - candles[i - 1].close;
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        values[i] = rsi_from(avg_gain, avg_loss);
    }

    values
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

/// ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100, undefined when C[i-n] == 0.
/// Warmup: first n bars.
pub fn calculate_roc(candles: &[Candle], period: usize) -> Vec<f64> {
    (0..candles.len())
        .map(|i| {
            if period == 0 || i < period {
                return f64::NAN;
            }
            let prev_close = candles[i - period].close;
            if prev_close == 0.0 {
                f64::NAN
            } else {
                (candles[i].close - prev_close) / prev_close * 100.0
            }
        })
        .collect()
}

/// %K = 100 * (C - LL(k)) / (HH(k) - LL(k)), 50 when the window is flat.
/// %D = SMA(d) of %K. Warmup: k-1 for %K, k-1 + d-1 for %D.
pub fn calculate_stochastic(
    candles: &[Candle],
    k_period: usize,
    d_period: usize,
) -> (Vec<f64>, Vec<f64>) {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let hh = rolling_max(&highs, k_period);
    let ll = rolling_min(&lows, k_period);

    let k: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = hh[i] - ll[i];
            if range.is_nan() {
                f64::NAN
            } else if range == 0.0 {
                50.0
            } else {
                100.0 * (c.close - ll[i]) / range
            }
        })
        .collect();
    let d = sma_of(&k, d_period);
    (k, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::tests_support::{make_candles, make_hlc};

    #[test]
    fn rsi_warmup() {
        let candles = make_candles(&[44.0, 44.5, 43.5, 44.0, 45.0, 46.0]);
        let rsi = calculate_rsi(&candles, 3);
        assert!(rsi[..3].iter().all(|v| v.is_nan()));
        assert!(!rsi[3].is_nan());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let rsi = calculate_rsi(&candles, 3);
        assert!((rsi[3] - 100.0).abs() < 1e-9);
        assert!((rsi[4] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_first_value_uses_simple_average() {
        // changes: +2, -1, +1 → avg_gain = 1, avg_loss = 1/3
        let candles = make_candles(&[10.0, 12.0, 11.0, 12.0]);
        let rsi = calculate_rsi(&candles, 3);
        let expected = 100.0 - 100.0 / (1.0 + 1.0 / (1.0 / 3.0));
        assert!((rsi[3] - expected).abs() < 1e-9);
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let candles = make_candles(&[10.0, 11.0, 9.0, 12.0, 8.0, 13.0, 7.0, 14.0]);
        let rsi = calculate_rsi(&candles, 2);
        for v in rsi.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn roc_basic() {
        let candles = make_candles(&[100.0, 105.0, 110.0]);
        let roc = calculate_roc(&candles, 2);
        assert!(roc[1].is_nan());
        assert!((roc[2] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn roc_zero_base_is_undefined() {
        let candles = make_candles(&[0.0, 5.0]);
        assert!(calculate_roc(&candles, 1)[1].is_nan());
    }

    #[test]
    fn stochastic_k_and_d() {
        let candles = make_hlc(&[
            (10.0, 8.0, 9.0),
            (12.0, 9.0, 11.0),
            (13.0, 10.0, 13.0),
            (13.0, 11.0, 11.0),
        ]);
        let (k, d) = calculate_stochastic(&candles, 3, 2);
        assert!(k[1].is_nan());
        // HH=13, LL=8, C=13
        assert!((k[2] - 100.0).abs() < 1e-9);
        // HH=13, LL=9, C=11
        assert!((k[3] - 50.0).abs() < 1e-9);
        assert!(d[2].is_nan());
        assert!((d[3] - 75.0).abs() < 1e-9);
    }

    #[test]
    fn stochastic_flat_window_is_midpoint() {
        let candles = make_candles(&[5.0, 5.0, 5.0]);
        let (k, _) = calculate_stochastic(&candles, 2, 1);
        assert!((k[2] - 50.0).abs() < 1e-9);
    }
}
