//! Swing points and their dominance.
//!
//! A swing high at bar i has a high strictly above the `strength` bars to its
//! left and at least as high as the `strength` bars to its right; swing lows
//! mirror this. It is confirmed at bar i + strength.
//!
//! Dominance is the number of bars after the swing that did not exceed it.
//! One forward pass keeps the unbroken swings on a stack per side. A new bar
//! can only break the weakest pending extremes, so it pops from the top:
//! pending highs are ordered by non-increasing price, lows by non-decreasing.

use crate::domain::candle::Candle;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: SwingKind,
    /// Bar at which the right-hand side completed.
    pub confirmed_at: usize,
    /// Bars after `index` that left the extreme intact. For a swing that was
    /// never exceeded this counts the remaining bars of the series.
    pub dominance: usize,
    /// First bar whose high (low) exceeded the extreme.
    pub broken_at: Option<usize>,
}

impl SwingPoint {
    pub fn is_high(&self) -> bool {
        self.kind == SwingKind::High
    }

    /// Dominance as it was known at `bar`, without reading later bars.
    pub fn dominance_at(&self, bar: usize) -> usize {
        match self.broken_at {
            Some(broken) if broken <= bar => self.dominance,
            _ => bar.saturating_sub(self.index),
        }
    }
}

fn is_swing(candles: &[Candle], i: usize, strength: usize, kind: SwingKind) -> bool {
    let pivot = match kind {
        SwingKind::High => candles[i].high,
        SwingKind::Low => candles[i].low,
    };
    let beats = |other: f64, strict: bool| match (kind, strict) {
        (SwingKind::High, true) => pivot > other,
        (SwingKind::High, false) => pivot >= other,
        (SwingKind::Low, true) => pivot < other,
        (SwingKind::Low, false) => pivot <= other,
    };
    let price = |c: &Candle| match kind {
        SwingKind::High => c.high,
        SwingKind::Low => c.low,
    };

    candles[i - strength..i].iter().all(|c| beats(price(c), true))
        && candles[i + 1..=i + strength]
            .iter()
            .all(|c| beats(price(c), false))
}

/// All swing highs and lows, ordered by bar index, with dominance stamped.
pub fn detect_swings(candles: &[Candle], strength: usize) -> Vec<SwingPoint> {
    let n = candles.len();
    let mut swings: Vec<SwingPoint> = Vec::new();
    let mut pending_highs: Vec<usize> = Vec::new();
    let mut pending_lows: Vec<usize> = Vec::new();

    for (j, candle) in candles.iter().enumerate() {
        while let Some(&top) = pending_highs.last() {
            if candle.high > swings[top].price {
                stamp(&mut swings[top], j);
                pending_highs.pop();
            } else {
                break;
            }
        }
        while let Some(&top) = pending_lows.last() {
            if candle.low < swings[top].price {
                stamp(&mut swings[top], j);
                pending_lows.pop();
            } else {
                break;
            }
        }

        if j < 2 * strength {
            continue;
        }
        let pivot = j - strength;
        for kind in [SwingKind::High, SwingKind::Low] {
            if is_swing(candles, pivot, strength, kind) {
                let c = &candles[pivot];
                swings.push(SwingPoint {
                    index: pivot,
                    timestamp: c.timestamp,
                    price: if kind == SwingKind::High { c.high } else { c.low },
                    kind,
                    confirmed_at: j,
                    dominance: 0,
                    broken_at: None,
                });
                let slot = swings.len() - 1;
                match kind {
                    SwingKind::High => pending_highs.push(slot),
                    SwingKind::Low => pending_lows.push(slot),
                }
            }
        }
    }

    for &slot in pending_highs.iter().chain(&pending_lows) {
        swings[slot].dominance = n - 1 - swings[slot].index;
    }
    swings
}

fn stamp(swing: &mut SwingPoint, breaking_bar: usize) {
    swing.dominance = breaking_bar - swing.index - 1;
    swing.broken_at = Some(breaking_bar);
}

pub struct SwingSeries {
    pub price: Vec<f64>,
    pub dominance: Vec<f64>,
    pub bars_since: Vec<f64>,
}

/// Latest confirmed swing of `kind` at each bar. Undefined until the first
/// swing is confirmed.
pub fn swing_series(len: usize, swings: &[SwingPoint], kind: SwingKind) -> SwingSeries {
    let mut out = SwingSeries {
        price: vec![f64::NAN; len],
        dominance: vec![f64::NAN; len],
        bars_since: vec![f64::NAN; len],
    };

    let mut of_kind = swings.iter().filter(|s| s.kind == kind).peekable();
    let mut current: Option<&SwingPoint> = None;
    for bar in 0..len {
        while let Some(next) = of_kind.peek() {
            if next.confirmed_at <= bar {
                current = of_kind.next();
            } else {
                break;
            }
        }
        if let Some(swing) = current {
            out.price[bar] = swing.price;
            out.dominance[bar] = swing.dominance_at(bar) as f64;
            out.bars_since[bar] = (bar - swing.index) as f64;
        }
    }
    out
}

/// Running highest high up to and including each bar.
pub fn calculate_all_time_high(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .scan(f64::NEG_INFINITY, |best, c| {
            *best = best.max(c.high);
            Some(*best)
        })
        .collect()
}

/// Running lowest low up to and including each bar.
pub fn calculate_all_time_low(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .scan(f64::INFINITY, |best, c| {
            *best = best.min(c.low);
            Some(*best)
        })
        .collect()
}
