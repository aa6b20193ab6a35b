//! Session volume profile: point of control and value area.
//!
//! Each candle's volume is spread uniformly over its [low, high] range and
//! binned between the session's lowest low and highest high. The point of
//! control is the fullest bin (lowest price on ties). The value area grows
//! one bin to each side of it per step until it holds `value_area_pct` of
//! the session volume.

use crate::domain::candle::Candle;
use crate::domain::indicator::ProfileSession;
use chrono::Datelike;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileLevels {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
}

pub struct ProfileSeries {
    pub poc: Vec<f64>,
    pub vah: Vec<f64>,
    pub val: Vec<f64>,
}

/// Index of the fullest slot, earliest on ties. `None` when every slot is
/// empty.
pub(crate) fn point_of_control(volumes: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in volumes.iter().enumerate() {
        if v > 0.0 && best.is_none_or(|b| v > volumes[b]) {
            best = Some(i);
        }
    }
    best
}

/// Inclusive slot range of the value area around `poc`.
pub(crate) fn value_area(volumes: &[f64], poc: usize, pct: f64) -> (usize, usize) {
    let total: f64 = volumes.iter().sum();
    let target = total * pct;
    let (mut lo, mut hi) = (poc, poc);
    let mut enclosed = volumes[poc];

    while enclosed < target && (lo > 0 || hi + 1 < volumes.len()) {
        if lo > 0 {
            lo -= 1;
            enclosed += volumes[lo];
        }
        if hi + 1 < volumes.len() {
            hi += 1;
            enclosed += volumes[hi];
        }
    }
    (lo, hi)
}

/// Profile of one session's candles. `None` without traded volume.
pub fn profile_of(candles: &[Candle], bins: usize, value_area_pct: f64) -> Option<ProfileLevels> {
    if bins == 0 {
        return None;
    }
    let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    if !low.is_finite() || !high.is_finite() {
        return None;
    }
    if candles.iter().map(|c| c.volume).sum::<f64>() <= 0.0 {
        return None;
    }
    if high <= low {
        return Some(ProfileLevels {
            poc: low,
            vah: low,
            val: low,
        });
    }

    let width = (high - low) / bins as f64;
    let slot = |price: f64| (((price - low) / width) as usize).min(bins - 1);
    let mut volumes = vec![0.0; bins];

    for c in candles {
        if c.volume <= 0.0 {
            continue;
        }
        let span = c.high - c.low;
        if span <= 0.0 {
            volumes[slot(c.close)] += c.volume;
            continue;
        }
        for (b, bucket) in volumes.iter_mut().enumerate().take(slot(c.high) + 1).skip(slot(c.low)) {
            let bin_lo = low + b as f64 * width;
            let overlap = (c.high.min(bin_lo + width) - c.low.max(bin_lo)).max(0.0);
            *bucket += c.volume * overlap / span;
        }
    }

    let poc = point_of_control(&volumes)?;
    let (lo, hi) = value_area(&volumes, poc, value_area_pct);
    Some(ProfileLevels {
        poc: low + (poc as f64 + 0.5) * width,
        vah: low + (hi + 1) as f64 * width,
        val: low + lo as f64 * width,
    })
}

fn session_start(candles: &[Candle], session: ProfileSession, bar: usize) -> Option<usize> {
    match session {
        ProfileSession::Rolling(n) => (n > 0 && bar + 1 >= n).then(|| bar + 1 - n),
        ProfileSession::Daily => {
            let day = candles[bar].timestamp.date_naive().num_days_from_ce();
            let mut start = bar;
            while start > 0 && candles[start - 1].timestamp.date_naive().num_days_from_ce() == day {
                start -= 1;
            }
            Some(start)
        }
    }
}

/// Profile levels at each bar over the session ending at that bar.
pub fn calculate_volume_profile(
    candles: &[Candle],
    session: ProfileSession,
    bins: usize,
    value_area_pct: f64,
) -> ProfileSeries {
    let n = candles.len();
    let mut out = ProfileSeries {
        poc: vec![f64::NAN; n],
        vah: vec![f64::NAN; n],
        val: vec![f64::NAN; n],
    };

    for bar in 0..n {
        let Some(start) = session_start(candles, session, bar) else {
            continue;
        };
        if let Some(levels) = profile_of(&candles[start..=bar], bins, value_area_pct) {
            out.poc[bar] = levels.poc;
            out.vah[bar] = levels.vah;
            out.val[bar] = levels.val;
        }
    }
    out
}
