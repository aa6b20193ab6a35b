//! Volatility indicators: ATR, standard deviation, Bollinger bands, Supertrend.

use crate::domain::candle::Candle;
use crate::domain::indicator::moving_average::closes;

/// Wilder ATR. TR[0] = high - low; seed at bar n-1 with the mean of the
/// first n true ranges, then ATR = (prev * (n-1) + TR) / n.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period {
        return values;
    }

    let tr: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    values[period - 1] = atr;
    for i in period..candles.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        values[i] = atr;
    }
    values
}

/// Population mean and standard deviation of `window`.
fn mean_stddev(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Population standard deviation over n closes. Warmup: n-1.
pub fn calculate_stddev(candles: &[Candle], period: usize) -> Vec<f64> {
    let closes = closes(candles);
    (0..closes.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                f64::NAN
            } else {
                mean_stddev(&closes[i + 1 - period..=i]).1
            }
        })
        .collect()
}

pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Middle = SMA(n), upper/lower = middle ± mult × population stddev.
/// Warmup: n-1.
pub fn calculate_bbands(candles: &[Candle], period: usize, stddev_mult_x100: u32) -> Bands {
    let closes = closes(candles);
    let mult = stddev_mult_x100 as f64 / 100.0;
    let mut bands = Bands {
        upper: vec![f64::NAN; closes.len()],
        middle: vec![f64::NAN; closes.len()],
        lower: vec![f64::NAN; closes.len()],
    };
    if period == 0 {
        return bands;
    }

    for i in (period - 1)..closes.len() {
        let (mean, stddev) = mean_stddev(&closes[i + 1 - period..=i]);
        bands.middle[i] = mean;
        bands.upper[i] = mean + mult * stddev;
        bands.lower[i] = mean - mult * stddev;
    }
    bands
}

pub struct SupertrendSeries {
    /// +1 in an uptrend, -1 in a downtrend.
    pub trend: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Supertrend over ATR(period) bands around hl2. Bands only tighten while
/// the trend holds; the trend flips when the close crosses the opposite band.
/// Warmup: period-1.
pub fn calculate_supertrend(candles: &[Candle], period: usize, mult_x100: u32) -> SupertrendSeries {
    let n = candles.len();
    let mut out = SupertrendSeries {
        trend: vec![f64::NAN; n],
        upper: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    let atr = calculate_atr(candles, period);
    let mult = mult_x100 as f64 / 100.0;
    let Some(start) = atr.iter().position(|v| !v.is_nan()) else {
        return out;
    };

    let mut trend = 1.0;
    let mut final_upper = f64::NAN;
    let mut final_lower = f64::NAN;

    for i in start..n {
        let c = &candles[i];
        let hl2 = (c.high + c.low) / 2.0;
        let basic_upper = hl2 + mult * atr[i];
        let basic_lower = hl2 - mult * atr[i];

        if i == start {
            final_upper = basic_upper;
            final_lower = basic_lower;
        } else {
            let prev_close = candles[i - 1].close;
            if basic_upper < final_upper || prev_close > final_upper {
                final_upper = basic_upper;
            }
            if basic_lower > final_lower || prev_close < final_lower {
                final_lower = basic_lower;
            }
            if trend > 0.0 && c.close < final_lower {
                trend = -1.0;
            } else if trend < 0.0 && c.close > final_upper {
                trend = 1.0;
            }
        }

        out.trend[i] = trend;
        out.upper[i] = final_upper;
        out.lower[i] = final_lower;
    }
    out
}
