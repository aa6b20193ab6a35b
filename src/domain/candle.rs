//! Market data model: candles, trades, per-exchange flows and the bound series.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: Option<u64>,
    pub taker_buy_volume: Option<f64>,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

/// A single executed trade; `side` is the aggressor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: Side,
}

/// Aggressor volumes from one exchange, aligned 1:1 with the series candles.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExchangeFlow {
    pub exchange: String,
    pub buy_volume: Vec<f64>,
    pub sell_volume: Vec<f64>,
}

impl ExchangeFlow {
    /// Buy minus sell volume at `bar`, NaN when the flow does not cover it.
    pub fn delta_at(&self, bar: usize) -> f64 {
        match (self.buy_volume.get(bar), self.sell_volume.get(bar)) {
            (Some(buy), Some(sell)) => buy - sell,
            _ => f64::NAN,
        }
    }

    pub fn total_at(&self, bar: usize) -> f64 {
        match (self.buy_volume.get(bar), self.sell_volume.get(bar)) {
            (Some(buy), Some(sell)) => buy + sell,
            _ => f64::NAN,
        }
    }
}

/// One symbol at one timeframe, as supplied by the series store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    /// Trades sorted by timestamp; empty when tick data is unavailable.
    pub trades: Vec<Trade>,
    pub exchanges: Vec<ExchangeFlow>,
    /// Funding rate per bar, aligned with `candles`.
    pub funding_rates: Option<Vec<f64>>,
}

impl MarketSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles,
            trades: Vec::new(),
            exchanges: Vec::new(),
            funding_rates: None,
        }
    }

    pub fn with_trades(mut self, trades: Vec<Trade>) -> Self {
        self.trades = trades;
        self
    }

    pub fn with_exchange(mut self, flow: ExchangeFlow) -> Self {
        self.exchanges.push(flow);
        self
    }

    pub fn with_funding_rates(mut self, rates: Vec<f64>) -> Self {
        self.funding_rates = Some(rates);
        self
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeFlow> {
        self.exchanges
            .iter()
            .find(|flow| flow.exchange.eq_ignore_ascii_case(name))
    }

    /// Bars whose timestamp lies in `[start, end)`, with trades, flows and
    /// funding cut to the same span.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketSeries {
        let first = self.candles.partition_point(|c| c.timestamp < start);
        let last = self.candles.partition_point(|c| c.timestamp < end).max(first);
        let slice = |values: &[f64]| {
            values
                .get(first..last.min(values.len()))
                .map(<[f64]>::to_vec)
                .unwrap_or_default()
        };
        MarketSeries {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candles: self.candles[first..last].to_vec(),
            trades: self
                .trades
                .iter()
                .filter(|t| start <= t.timestamp && t.timestamp < end)
                .cloned()
                .collect(),
            exchanges: self
                .exchanges
                .iter()
                .map(|flow| ExchangeFlow {
                    exchange: flow.exchange.clone(),
                    buy_volume: slice(&flow.buy_volume),
                    sell_volume: slice(&flow.sell_volume),
                })
                .collect(),
            funding_rates: self.funding_rates.as_deref().map(slice),
        }
    }

    /// Groups trades by the bar whose `[timestamp, timestamp + timeframe)`
    /// interval contains them. Trades outside every bar are dropped.
    pub fn trades_by_bar(&self) -> Vec<&[Trade]> {
        let empty: &[Trade] = &[];
        let mut buckets: Vec<&[Trade]> = vec![empty; self.candles.len()];
        if self.trades.is_empty() {
            return buckets;
        }

        let step = self.timeframe.duration();
        let mut cursor = 0;
        for (i, candle) in self.candles.iter().enumerate() {
            let end = candle.timestamp + step;
            while cursor < self.trades.len() && self.trades[cursor].timestamp < candle.timestamp {
                cursor += 1;
            }
            let start = cursor;
            while cursor < self.trades.len() && self.trades[cursor].timestamp < end {
                cursor += 1;
            }
            buckets[i] = &self.trades[start..cursor];
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(minute: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            trade_count: None,
            taker_buy_volume: None,
        }
    }

    fn trade_at(second: i64, price: f64) -> Trade {
        Trade {
            timestamp: Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap(),
            price,
            size: 1.0,
            side: Side::Buy,
        }
    }

    #[test]
    fn typical_price() {
        let c = candle_at(0, 105.0);
        let expected = (106.0 + 104.0 + 105.0) / 3.0;
        assert!((c.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let c = candle_at(0, 105.0);
        // high-low=2, |106-100|=6, |104-100|=4 → 6
        assert!((c.true_range(100.0) - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn timeframe_durations() {
        assert_eq!(Timeframe::M15.duration(), Duration::minutes(15));
        assert_eq!(Timeframe::H4.duration(), Duration::hours(4));
        assert_eq!(Timeframe::D1.to_string(), "1d");
    }

    #[test]
    fn trades_bucketed_by_bar_interval() {
        let series = MarketSeries::new(
            "BTCUSDT",
            Timeframe::M1,
            vec![candle_at(0, 100.0), candle_at(1, 101.0), candle_at(2, 102.0)],
        )
        .with_trades(vec![
            trade_at(-5, 99.0),
            trade_at(0, 100.0),
            trade_at(59, 100.5),
            trade_at(60, 101.0),
            trade_at(200, 103.0),
        ]);

        let buckets = series.trades_by_bar();
        assert_eq!(buckets[0].len(), 2);
        assert_eq!(buckets[1].len(), 1);
        assert!(buckets[2].is_empty());
    }

    #[test]
    fn exchange_lookup_is_case_insensitive() {
        let series = MarketSeries::new("BTCUSDT", Timeframe::M1, vec![candle_at(0, 100.0)])
            .with_exchange(ExchangeFlow {
                exchange: "Binance".into(),
                buy_volume: vec![60.0],
                sell_volume: vec![40.0],
            });
        let flow = series.exchange("binance").unwrap();
        assert!((flow.delta_at(0) - 20.0).abs() < f64::EPSILON);
        assert!(flow.delta_at(1).is_nan());
    }

    #[test]
    fn between_cuts_every_aligned_column() {
        let series = MarketSeries::new(
            "BTCUSDT",
            Timeframe::M1,
            vec![candle_at(0, 100.0), candle_at(1, 101.0), candle_at(2, 102.0)],
        )
        .with_trades(vec![trade_at(0, 100.0), trade_at(70, 101.0), trade_at(130, 102.0)])
        .with_exchange(ExchangeFlow {
            exchange: "binance".into(),
            buy_volume: vec![1.0, 2.0, 3.0],
            sell_volume: vec![3.0, 2.0, 1.0],
        })
        .with_funding_rates(vec![0.01, 0.02, 0.03]);

        let start = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_120, 0).unwrap();
        let cut = series.between(start, end);

        assert_eq!(cut.len(), 1);
        assert_eq!(cut.candles[0].close, 101.0);
        assert_eq!(cut.trades.len(), 1);
        assert_eq!(cut.exchanges[0].buy_volume, vec![2.0]);
        assert_eq!(cut.funding_rates, Some(vec![0.02]));
    }

    #[test]
    fn between_with_inverted_range_is_empty() {
        let series = MarketSeries::new("BTCUSDT", Timeframe::M1, vec![candle_at(0, 100.0)]);
        let late = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let early = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        assert!(series.between(late, early).is_empty());
    }
}
