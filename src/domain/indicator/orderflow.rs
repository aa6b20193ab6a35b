//! Aggressor-side volume metrics and cross-exchange delta.
//!
//! Buy volume comes from the candle's taker-buy volume when present and
//! otherwise from the bar's trades. Bars with neither are undefined.

use crate::domain::candle::{MarketSeries, Side, Trade};

pub struct FlowSeries {
    pub buy_volume: Vec<f64>,
    pub sell_volume: Vec<f64>,
    pub delta: Vec<f64>,
    pub cvd: Vec<f64>,
    pub trade_count: Vec<f64>,
}

fn trade_sides(trades: &[Trade]) -> (f64, f64) {
    trades.iter().fold((0.0, 0.0), |(buy, sell), t| match t.side {
        Side::Buy => (buy + t.size, sell),
        Side::Sell => (buy, sell + t.size),
    })
}

pub fn calculate_flow(series: &MarketSeries) -> FlowSeries {
    let n = series.len();
    let buckets = series.trades_by_bar();
    let has_trades = !series.trades.is_empty();
    let mut out = FlowSeries {
        buy_volume: vec![f64::NAN; n],
        sell_volume: vec![f64::NAN; n],
        delta: vec![f64::NAN; n],
        cvd: vec![f64::NAN; n],
        trade_count: vec![f64::NAN; n],
    };

    let mut cumulative: Option<f64> = None;
    for (i, candle) in series.candles.iter().enumerate() {
        let sides = match candle.taker_buy_volume {
            Some(buy) => Some((buy, candle.volume - buy)),
            None if has_trades => Some(trade_sides(buckets[i])),
            None => None,
        };
        if let Some((buy, sell)) = sides {
            out.buy_volume[i] = buy;
            out.sell_volume[i] = sell;
            out.delta[i] = buy - sell;
            cumulative = Some(cumulative.unwrap_or(0.0) + buy - sell);
        }
        out.cvd[i] = cumulative.unwrap_or(f64::NAN);

        out.trade_count[i] = match candle.trade_count {
            Some(count) => count as f64,
            None if has_trades => buckets[i].len() as f64,
            None => f64::NAN,
        };
    }
    out
}

pub fn calculate_funding(series: &MarketSeries) -> Vec<f64> {
    (0..series.len())
        .map(|i| {
            series
                .funding_rates
                .as_ref()
                .and_then(|rates| rates.get(i).copied())
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Delta of one named exchange; all NaN when the exchange is unknown.
pub fn calculate_exchange_delta(series: &MarketSeries, exchange: &str) -> Vec<f64> {
    match series.exchange(exchange) {
        Some(flow) => (0..series.len()).map(|i| flow.delta_at(i)).collect(),
        None => vec![f64::NAN; series.len()],
    }
}

/// Sum of every exchange's delta. Exchanges not covering a bar are skipped;
/// a bar no exchange covers is undefined.
pub fn calculate_combined_delta(series: &MarketSeries) -> Vec<f64> {
    (0..series.len())
        .map(|i| {
            let deltas: Vec<f64> = series
                .exchanges
                .iter()
                .map(|flow| flow.delta_at(i))
                .filter(|d| !d.is_nan())
                .collect();
            if deltas.is_empty() {
                f64::NAN
            } else {
                deltas.iter().sum()
            }
        })
        .collect()
}

/// True when two exchanges push in opposite directions, each with
/// |delta| / volume at or above `threshold`.
pub fn calculate_delta_divergence(series: &MarketSeries, threshold: f64) -> Vec<bool> {
    (0..series.len())
        .map(|i| {
            let mut buying = false;
            let mut selling = false;
            for flow in &series.exchanges {
                let delta = flow.delta_at(i);
                let total = flow.total_at(i);
                if delta.is_nan() || total <= 0.0 || delta.abs() / total < threshold {
                    continue;
                }
                if delta > 0.0 {
                    buying = true;
                } else if delta < 0.0 {
                    selling = true;
                }
            }
            buying && selling
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::{ExchangeFlow, Timeframe};
    use crate::domain::indicator::tests_support::make_candles;
    use chrono::Duration;

    fn with_taker(buys: &[f64]) -> MarketSeries {
        let mut candles = make_candles(&vec![100.0; buys.len()]);
        for (c, &b) in candles.iter_mut().zip(buys) {
            c.taker_buy_volume = Some(b);
        }
        MarketSeries::new("BTCUSDT", Timeframe::M1, candles)
    }

    #[test]
    fn delta_from_taker_volume() {
        // volume is 1000 per bar
        let flow = calculate_flow(&with_taker(&[600.0, 300.0, 500.0]));
        assert_eq!(flow.delta, vec![200.0, -400.0, 0.0]);
        assert_eq!(flow.cvd, vec![200.0, -200.0, -200.0]);
        assert_eq!(flow.sell_volume[1], 700.0);
    }

    #[test]
    fn delta_from_trades_without_taker_volume() {
        let candles = make_candles(&[100.0, 101.0]);
        let t0 = candles[0].timestamp;
        let trades = vec![
            Trade { timestamp: t0, price: 100.0, size: 3.0, side: Side::Buy },
            Trade { timestamp: t0 + Duration::seconds(10), price: 100.0, size: 1.0, side: Side::Sell },
            Trade { timestamp: t0 + Duration::seconds(70), price: 101.0, size: 2.0, side: Side::Sell },
        ];
        let series = MarketSeries::new("BTCUSDT", Timeframe::M1, candles).with_trades(trades);
        let flow = calculate_flow(&series);
        assert_eq!(flow.delta, vec![2.0, -2.0]);
        assert_eq!(flow.trade_count, vec![2.0, 1.0]);
    }

    #[test]
    fn missing_flow_data_is_undefined() {
        let series = MarketSeries::new("BTCUSDT", Timeframe::M1, make_candles(&[1.0, 2.0]));
        let flow = calculate_flow(&series);
        assert!(flow.delta.iter().all(|v| v.is_nan()));
        assert!(flow.cvd.iter().all(|v| v.is_nan()));
        assert!(calculate_funding(&series).iter().all(|v| v.is_nan()));
        assert!(calculate_combined_delta(&series).iter().all(|v| v.is_nan()));
    }

    fn two_exchanges() -> MarketSeries {
        MarketSeries::new("BTCUSDT", Timeframe::M1, make_candles(&[1.0, 2.0]))
            .with_exchange(ExchangeFlow {
                exchange: "binance".into(),
                buy_volume: vec![80.0, 50.0],
                sell_volume: vec![20.0, 50.0],
            })
            .with_exchange(ExchangeFlow {
                exchange: "bybit".into(),
                buy_volume: vec![10.0, 52.0],
                sell_volume: vec![40.0, 48.0],
            })
    }

    #[test]
    fn exchange_and_combined_delta() {
        let series = two_exchanges();
        assert_eq!(calculate_exchange_delta(&series, "BINANCE"), vec![60.0, 0.0]);
        assert_eq!(calculate_combined_delta(&series), vec![30.0, 4.0]);
        assert!(calculate_exchange_delta(&series, "okx")[0].is_nan());
    }

    #[test]
    fn divergence_needs_opposite_signs_above_threshold() {
        let series = two_exchanges();
        // bar 0: +0.6 vs -0.6 of volume; bar 1: 0 vs +0.04
        assert_eq!(calculate_delta_divergence(&series, 0.1), vec![true, false]);
        assert_eq!(calculate_delta_divergence(&series, 0.7), vec![false, false]);
    }
}
