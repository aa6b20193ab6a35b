//! Volume-weighted indicators (OBV, session VWAP).

use crate::domain::candle::Candle;
use chrono::Datelike;

/// OBV[0] = volume[0]
/// If close[i] > close[i-1]: OBV[i] = OBV[i-1] + volume[i]
/// If close[i] < close[i-1]: OBV[i] = OBV[i-1] - volume[i]
/// If close[i] == close[i-1]: OBV[i] = OBV[i-1]
///
/// No warmup period; all bars are valid.
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    let mut values = Vec::with_capacity(candles.len());
    let mut obv = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        if i == 0 {
            obv = candle.volume;
        } else if candle.close > candles[i - 1].close {
            obv += candle.volume;
        } else if candle.close < candles[i - 1].close {
            obv -= candle.volume;
        }
        values.push(obv);
    }
    values
}

/// Cumulative typical-price VWAP, reset at each UTC day boundary.
/// Undefined until the session has traded volume.
pub fn calculate_vwap(candles: &[Candle]) -> Vec<f64> {
    let mut values = Vec::with_capacity(candles.len());
    let mut sum_pv = 0.0;
    let mut sum_v = 0.0;
    let mut session = None;

    for candle in candles {
        let day = candle.timestamp.date_naive().num_days_from_ce();
        if session != Some(day) {
            session = Some(day);
            sum_pv = 0.0;
            sum_v = 0.0;
        }
        sum_pv += candle.typical_price() * candle.volume;
        sum_v += candle.volume;
        values.push(if sum_v > 0.0 { sum_pv / sum_v } else { f64::NAN });
    }
    values
}
