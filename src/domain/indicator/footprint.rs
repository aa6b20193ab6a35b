//! Footprint: per-bar trade volume by price level.

use crate::domain::candle::{Candle, MarketSeries, Side};
use crate::domain::indicator::volume_profile::{point_of_control, value_area};

/// Tick size derived from price when none is configured.
pub const AUTO_TICK_FRACTION: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelVolume {
    pub price: f64,
    pub buy: f64,
    pub sell: f64,
}

impl LevelVolume {
    pub fn total(&self) -> f64 {
        self.buy + self.sell
    }

    /// One side outweighs the other by at least `ratio`.
    pub fn is_imbalanced(&self, ratio: f64) -> bool {
        let (strong, weak) = if self.buy >= self.sell {
            (self.buy, self.sell)
        } else {
            (self.sell, self.buy)
        };
        strong > 0.0 && strong >= ratio * weak
    }
}

/// Footprint level selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FootprintLevel {
    Poc,
    Vah,
    Val,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintBar {
    /// Ascending by price, one entry per tick between the extremes.
    pub levels: Vec<LevelVolume>,
    pub poc: usize,
    pub vah: usize,
    pub val: usize,
}

impl FootprintBar {
    pub fn level(&self, which: FootprintLevel) -> &LevelVolume {
        match which {
            FootprintLevel::Poc => &self.levels[self.poc],
            FootprintLevel::Vah => &self.levels[self.vah],
            FootprintLevel::Val => &self.levels[self.val],
        }
    }
}

fn tick_for(candle: &Candle, tick_size: f64) -> f64 {
    if tick_size > 0.0 {
        tick_size
    } else {
        candle.close.abs() * AUTO_TICK_FRACTION
    }
}

/// Footprint of every bar; `None` for bars without trades.
pub fn calculate_footprint(
    series: &MarketSeries,
    tick_size: f64,
    value_area_pct: f64,
) -> Vec<Option<FootprintBar>> {
    series
        .trades_by_bar()
        .into_iter()
        .zip(&series.candles)
        .map(|(trades, candle)| {
            let tick = tick_for(candle, tick_size);
            if trades.is_empty() || tick.is_nan() || tick <= 0.0 {
                return None;
            }
            let slot = |price: f64| (price / tick).round() as i64;
            let lowest = trades.iter().map(|t| slot(t.price)).min()?;
            let highest = trades.iter().map(|t| slot(t.price)).max()?;

            let mut levels: Vec<LevelVolume> = (lowest..=highest)
                .map(|s| LevelVolume {
                    price: s as f64 * tick,
                    buy: 0.0,
                    sell: 0.0,
                })
                .collect();
            for trade in trades {
                let level = &mut levels[(slot(trade.price) - lowest) as usize];
                match trade.side {
                    Side::Buy => level.buy += trade.size,
                    Side::Sell => level.sell += trade.size,
                }
            }

            let totals: Vec<f64> = levels.iter().map(LevelVolume::total).collect();
            let poc = point_of_control(&totals)?;
            let (val, vah) = value_area(&totals, poc, value_area_pct);
            Some(FootprintBar {
                levels,
                poc,
                vah,
                val,
            })
        })
        .collect()
}

/// Heavy volume without price progress: volume at least `volume_ratio`
/// times the mean of the previous `lookback` bars while the body moves
/// less than `move_pct` percent of the open.
pub fn calculate_absorption(
    candles: &[Candle],
    lookback: usize,
    volume_ratio: f64,
    move_pct: f64,
) -> Vec<bool> {
    let mut window_sum = 0.0;
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let flagged = if lookback > 0 && i >= lookback {
                let average = window_sum / lookback as f64;
                let body_pct = if c.open != 0.0 {
                    (c.close - c.open).abs() / c.open.abs() * 100.0
                } else {
                    f64::NAN
                };
                average > 0.0 && c.volume >= volume_ratio * average && body_pct < move_pct
            } else {
                false
            };
            window_sum += c.volume;
            if lookback > 0 && i >= lookback {
                window_sum -= candles[i - lookback].volume;
            }
            flagged
        })
        .collect()
}
