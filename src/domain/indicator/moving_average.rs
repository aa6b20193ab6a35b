//! Moving averages over closes or an arbitrary value array.
//!
//! - SMA(n): mean of the last n values. Warmup: n-1.
//! - EMA(n): k = 2/(n+1), seeded with the first SMA, then
//!   EMA[i] = V[i]*k + EMA[i-1]*(1-k). Warmup: n-1.
//! - WMA(n): (1*V[i-n+1] + ... + n*V[i]) / (n*(n+1)/2), O(n) sliding sums.
//!   Warmup: n-1.
//!
//! The `_of` variants skip leading NaNs in their input, so they can be
//! chained onto another indicator's output (MACD signal, stochastic %D).

use crate::domain::candle::Candle;

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

fn first_defined(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| !v.is_nan())
}

pub fn sma_of(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = first_defined(values) else {
        return out;
    };
    if period == 0 {
        return out;
    }

    let mut sum = 0.0;
    for i in start..values.len() {
        sum += values[i];
        if i >= start + period {
            sum -= values[i - period];
        }
        if i + 1 >= start + period {
            out[i] = sum / period as f64;
        }
    }
    out
}

pub fn ema_of(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = first_defined(values) else {
        return out;
    };
    if period == 0 || values.len() < start + period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period - 1;
    let mut ema = values[start..=seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end] = ema;

    for i in (seed_end + 1)..values.len() {
        ema = values[i] * k + ema * (1.0 - k);
        out[i] = ema;
    }
    out
}

pub fn wma_of(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = first_defined(values) else {
        return out;
    };
    if period == 0 {
        return out;
    }

    let divisor = (period * (period + 1)) as f64 / 2.0;
    let mut weighted_sum = 0.0;
    let mut window_sum = 0.0;

    for i in start..values.len() {
        let offset = i - start;
        if offset < period {
            weighted_sum += (offset + 1) as f64 * values[i];
            window_sum += values[i];
        } else {
            weighted_sum += period as f64 * values[i] - window_sum;
            window_sum += values[i] - values[i - period];
        }
        if offset + 1 >= period {
            out[i] = weighted_sum / divisor;
        }
    }
    out
}

pub fn calculate_sma(candles: &[Candle], period: usize) -> Vec<f64> {
    sma_of(&closes(candles), period)
}

pub fn calculate_ema(candles: &[Candle], period: usize) -> Vec<f64> {
    ema_of(&closes(candles), period)
}

pub fn calculate_wma(candles: &[Candle], period: usize) -> Vec<f64> {
    wma_of(&closes(candles), period)
}
