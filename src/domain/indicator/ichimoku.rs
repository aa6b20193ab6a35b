//! Ichimoku cloud.
//!
//! tenkan = (HH + LL) / 2 over `tenkan` bars, kijun likewise over `kijun`.
//! senkou_a = (tenkan + kijun) / 2 and senkou_b = midpoint over `senkou`
//! bars, both displaced forward by `kijun` bars: the value read at bar i was
//! computed at bar i - kijun.
//! chikou is the close reported from bar `kijun` onward, so it never reads
//! bars after the one being evaluated.

use crate::domain::candle::Candle;
use crate::domain::indicator::window::{rolling_max, rolling_min};

pub struct IchimokuSeries {
    pub tenkan: Vec<f64>,
    pub kijun: Vec<f64>,
    pub senkou_a: Vec<f64>,
    pub senkou_b: Vec<f64>,
    pub chikou: Vec<f64>,
}

fn midpoint(highs: &[f64], lows: &[f64], period: usize) -> Vec<f64> {
    rolling_max(highs, period)
        .iter()
        .zip(rolling_min(lows, period))
        .map(|(h, l)| (h + l) / 2.0)
        .collect()
}

fn displaced(values: &[f64], shift: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= shift { values[i - shift] } else { f64::NAN })
        .collect()
}

pub fn calculate_ichimoku(
    candles: &[Candle],
    tenkan_period: usize,
    kijun_period: usize,
    senkou_period: usize,
) -> IchimokuSeries {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let tenkan = midpoint(&highs, &lows, tenkan_period);
    let kijun = midpoint(&highs, &lows, kijun_period);
    let span_a: Vec<f64> = tenkan.iter().zip(&kijun).map(|(t, k)| (t + k) / 2.0).collect();
    let span_b = midpoint(&highs, &lows, senkou_period);

    let chikou = candles
        .iter()
        .enumerate()
        .map(|(i, c)| if i >= kijun_period { c.close } else { f64::NAN })
        .collect();

    IchimokuSeries {
        senkou_a: displaced(&span_a, kijun_period),
        senkou_b: displaced(&span_b, kijun_period),
        tenkan,
        kijun,
        chikou,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::tests_support::make_hlc;

    fn ramp(n: usize) -> Vec<Candle> {
        let rows: Vec<(f64, f64, f64)> = (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                (base + 1.0, base - 1.0, base)
            })
            .collect();
        make_hlc(&rows)
    }

    #[test]
    fn tenkan_is_window_midpoint() {
        let candles = ramp(10);
        let ich = calculate_ichimoku(&candles, 3, 5, 8);
        assert!(ich.tenkan[1].is_nan());
        // bars 0..=2: HH = 103, LL = 99
        assert!((ich.tenkan[2] - 101.0).abs() < 1e-9);
    }

    #[test]
    fn senkou_spans_are_displaced_by_kijun() {
        let candles = ramp(20);
        let ich = calculate_ichimoku(&candles, 3, 5, 8);
        // span_a first defined at bar 4 (kijun warmup), displaced to bar 9
        assert!(ich.senkou_a[8].is_nan());
        let expected = (ich.tenkan[4] + ich.kijun[4]) / 2.0;
        assert!((ich.senkou_a[9] - expected).abs() < 1e-9);
        // span_b first defined at bar 7, displaced to bar 12
        assert!(ich.senkou_b[11].is_nan());
        assert!(!ich.senkou_b[12].is_nan());
    }

    #[test]
    fn chikou_never_reads_future_bars() {
        let candles = ramp(10);
        let ich = calculate_ichimoku(&candles, 3, 5, 8);
        assert!(ich.chikou[4].is_nan());
        assert_eq!(ich.chikou[5], candles[5].close);
        assert_eq!(ich.chikou[9], candles[9].close);
    }
}
