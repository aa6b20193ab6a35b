//! Rotating structural trendlines.
//!
//! At bar i the window is bars `[i + 1 - lookback, i - skip]`. Its peaks are
//! the swing highs (swing lows for support) confirmed by the window's last
//! bar. The chain starts at the most significant peak: the highest (lowest
//! for support), with dominance breaking ties. It then repeatedly steps to
//! the later peak with the greatest slope from the current one, which is
//! the first peak a ray pivoting clockwise from vertical would touch.
//! Support mirrors this with the least slope. The chain ends at the last
//! peak before the skip zone.
//!
//! Segments are stored newest first: `segments[0]` starts at the most
//! recent peak and its slope is what gets projected to the current bar.

use crate::domain::candle::Candle;
use crate::domain::indicator::swing::{SwingKind, SwingPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RayKind {
    Resistance,
    Support,
}

impl RayKind {
    fn swing_kind(self) -> SwingKind {
        match self {
            RayKind::Resistance => SwingKind::High,
            RayKind::Support => SwingKind::Low,
        }
    }

    /// `a` is strictly further along the sweep than `b`.
    fn rotates_past(self, a: f64, b: f64) -> bool {
        match self {
            RayKind::Resistance => a > b,
            RayKind::Support => a < b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
}

/// One leg of the chain, from an older peak (`end`) to the newer peak
/// (`start`) it was projected from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySegment {
    pub start: Pivot,
    pub end: Pivot,
    /// Price change per bar, moving forward in time.
    pub slope: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RayChain {
    pub anchor: Pivot,
    pub segments: Vec<RaySegment>,
}

impl RayChain {
    /// Slope carried forward past the last peak. A lone anchor is flat.
    pub fn slope(&self) -> f64 {
        self.segments.first().map_or(0.0, |s| s.slope)
    }

    pub fn projection(&self, bar: usize) -> f64 {
        match self.segments.first() {
            Some(seg) => seg.start.price + seg.slope * (bar as f64 - seg.start.index as f64),
            None => self.anchor.price,
        }
    }
}

/// Swings of the ray's side inside `[lo, hi]` and confirmed by `hi`, in
/// bar order.
fn window_peaks(swings: &[SwingPoint], kind: RayKind, lo: usize, hi: usize) -> Vec<&SwingPoint> {
    swings
        .iter()
        .filter(|s| s.kind == kind.swing_kind() && s.index >= lo && s.confirmed_at <= hi)
        .filter(|s| !s.price.is_nan())
        .collect()
}

/// The chain visible at `bar`, or `None` when the window holds no
/// confirmed peak. `swings` must come from `detect_swings` over `candles`.
pub fn ray_chain_at(
    candles: &[Candle],
    swings: &[SwingPoint],
    kind: RayKind,
    lookback: usize,
    skip: usize,
    bar: usize,
) -> Option<RayChain> {
    if lookback == 0 || bar >= candles.len() || bar < skip {
        return None;
    }
    let lo = (bar + 1).saturating_sub(lookback);
    let hi = bar - skip;
    if lo > hi {
        return None;
    }

    let candidates = window_peaks(swings, kind, lo, hi);
    let mut current = 0;
    for (k, peak) in candidates.iter().enumerate() {
        let best = candidates[current];
        let more_dominant =
            peak.price == best.price && peak.dominance_at(bar) > best.dominance_at(bar);
        if kind.rotates_past(peak.price, best.price) || more_dominant {
            current = k;
        }
    }
    let peaks: Vec<Pivot> = candidates
        .iter()
        .map(|s| Pivot {
            index: s.index,
            price: s.price,
        })
        .collect();
    let anchor = *peaks.get(current)?;

    let mut forward: Vec<RaySegment> = Vec::new();
    loop {
        let from = peaks[current];
        let mut best: Option<(usize, f64)> = None;
        for (k, to) in peaks.iter().enumerate().skip(current + 1) {
            let slope = (to.price - from.price) / (to.index - from.index) as f64;
            // ties keep the nearest peak
            if best.is_none_or(|(_, s)| kind.rotates_past(slope, s)) {
                best = Some((k, slope));
            }
        }
        let Some((next, slope)) = best else {
            break;
        };
        forward.push(RaySegment {
            start: peaks[next],
            end: from,
            slope,
        });
        current = next;
    }
    forward.reverse();

    Some(RayChain {
        anchor,
        segments: forward,
    })
}

pub struct RaySeries {
    pub price: Vec<f64>,
    pub slope: Vec<f64>,
    pub broken: Vec<bool>,
}

/// Projected ray price, carried slope and broken flag at every bar.
/// Broken means the close is beyond the projection (above for resistance,
/// below for support); undefined bars are never broken.
pub fn calculate_rays(
    candles: &[Candle],
    swings: &[SwingPoint],
    kind: RayKind,
    lookback: usize,
    skip: usize,
) -> RaySeries {
    let n = candles.len();
    let mut out = RaySeries {
        price: vec![f64::NAN; n],
        slope: vec![f64::NAN; n],
        broken: vec![false; n],
    };

    for bar in 0..n {
        let Some(chain) = ray_chain_at(candles, swings, kind, lookback, skip, bar) else {
            continue;
        };
        let projected = chain.projection(bar);
        let close = candles[bar].close;
        out.price[bar] = projected;
        out.slope[bar] = chain.slope();
        out.broken[bar] = match kind {
            RayKind::Resistance => close > projected,
            RayKind::Support => close < projected,
        };
    }
    out
}
