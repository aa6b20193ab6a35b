//! Memoizing indicator library bound to one market series.
//!
//! The first read of an (indicator, parameters) key computes the whole
//! array; later reads at any bar are lookups. Each key owns a `OnceLock`,
//! so concurrent readers of an unmaterialized key block on a single
//! computation and then share the published `Arc`.

use crate::domain::ast::{OrderflowField, PriceField};
use crate::domain::candle::{Candle, MarketSeries};
use crate::domain::config::LibraryConfig;
use crate::domain::error::LibraryError;
use crate::domain::indicator::calendar::{self, AstroField, TimeField};
use crate::domain::indicator::footprint::{self, FootprintBar, FootprintLevel};
use crate::domain::indicator::orderflow::{self, FlowSeries};
use crate::domain::indicator::rays::{self, RayKind};
use crate::domain::indicator::swing::{self, SwingKind, SwingPoint};
use crate::domain::indicator::{
    ichimoku, macd, momentum, moving_average, volatility, volume, volume_profile, window,
};
use crate::domain::indicator::{Indicator, IndicatorSeries, IndicatorValue, ProfileSession};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

type Cell<V> = Arc<OnceLock<Arc<V>>>;

/// Key to compute-once cell map.
struct Memo<K, V> {
    cells: Mutex<HashMap<K, Cell<V>>>,
}

impl<K: Eq + Hash + Clone, V> Memo<K, V> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_compute(&self, key: &K, compute: impl FnOnce() -> V) -> Arc<V> {
        // the map lock is released before computing
        let cell = self.cells.lock().entry(key.clone()).or_default().clone();
        cell.get_or_init(|| Arc::new(compute())).clone()
    }

    fn is_ready(&self, key: &K) -> bool {
        self.cells
            .lock()
            .get(key)
            .is_some_and(|cell| cell.get().is_some())
    }

    fn ready_count(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }
}

/// Non-indicator arrays, keyed by function and canonical arguments.
/// Float arguments are keyed by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DerivedKey {
    HighOf(usize),
    LowOf(usize),
    RangePosition { period: usize, skip: usize },
    Funding,
    ExchangeDelta(String),
    CombinedDelta,
    Divergence(u64),
    Absorption { volume_ratio: u64, move_pct: u64 },
}

fn bool_column(flags: Vec<bool>) -> Vec<f64> {
    flags
        .into_iter()
        .map(|b| if b { 1.0 } else { 0.0 })
        .collect()
}

fn at(values: &[f64], bar: usize) -> f64 {
    values.get(bar).copied().unwrap_or(f64::NAN)
}

pub struct IndicatorLibrary {
    market: Arc<MarketSeries>,
    config: LibraryConfig,
    indicators: Memo<Indicator, IndicatorSeries>,
    derived: Memo<DerivedKey, Vec<f64>>,
    swings: Memo<usize, Vec<SwingPoint>>,
    flow: OnceLock<Arc<FlowSeries>>,
    footprint: OnceLock<Arc<Vec<Option<FootprintBar>>>>,
}

impl IndicatorLibrary {
    pub fn new(market: Arc<MarketSeries>, config: LibraryConfig) -> Self {
        Self {
            market,
            config,
            indicators: Memo::new(),
            derived: Memo::new(),
            swings: Memo::new(),
            flow: OnceLock::new(),
            footprint: OnceLock::new(),
        }
    }

    /// Rebinds to another series, dropping every cached array.
    pub fn bind(&mut self, market: Arc<MarketSeries>) {
        tracing::debug!(
            symbol = %market.symbol,
            timeframe = %market.timeframe,
            bars = market.len(),
            "rebinding indicator library"
        );
        *self = Self::new(market, self.config.clone());
    }

    pub fn market(&self) -> &MarketSeries {
        &self.market
    }

    pub fn candles(&self) -> &[Candle] {
        &self.market.candles
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.market.len()
    }

    pub fn is_empty(&self) -> bool {
        self.market.is_empty()
    }

    pub fn is_materialized(&self, indicator: &Indicator) -> bool {
        self.indicators.is_ready(indicator)
    }

    /// Number of arrays computed so far across every cache.
    pub fn materialized_len(&self) -> usize {
        self.indicators.ready_count()
            + self.derived.ready_count()
            + self.swings.ready_count()
            + usize::from(self.flow.get().is_some())
            + usize::from(self.footprint.get().is_some())
    }

    /// Whole-array result for `indicator`, computed on first use. An empty
    /// series yields empty arrays, which read as undefined at every bar.
    pub fn series(&self, indicator: &Indicator) -> Result<Arc<IndicatorSeries>, LibraryError> {
        validate(indicator)?;
        let series = self.indicators.get_or_compute(indicator, || {
            tracing::debug!(indicator = %indicator, bars = self.len(), "materializing indicator");
            self.compute(indicator)
        });
        Ok(series)
    }

    pub fn value_at(&self, indicator: &Indicator, bar: usize) -> Result<IndicatorValue, LibraryError> {
        let close = self.price(PriceField::Close, bar);
        Ok(self.series(indicator)?.value_at(bar, close))
    }

    fn compute(&self, indicator: &Indicator) -> IndicatorSeries {
        let candles = self.candles();
        match *indicator {
            Indicator::Sma(p) => IndicatorSeries::Simple(moving_average::calculate_sma(candles, p)),
            Indicator::Ema(p) => IndicatorSeries::Simple(moving_average::calculate_ema(candles, p)),
            Indicator::Wma(p) => IndicatorSeries::Simple(moving_average::calculate_wma(candles, p)),
            Indicator::Rsi(p) => IndicatorSeries::Simple(momentum::calculate_rsi(candles, p)),
            Indicator::Roc(p) => IndicatorSeries::Simple(momentum::calculate_roc(candles, p)),
            Indicator::Atr(p) => IndicatorSeries::Simple(volatility::calculate_atr(candles, p)),
            Indicator::Stddev(p) => IndicatorSeries::Simple(volatility::calculate_stddev(candles, p)),
            Indicator::Obv => IndicatorSeries::Simple(volume::calculate_obv(candles)),
            Indicator::Vwap => IndicatorSeries::Simple(volume::calculate_vwap(candles)),
            Indicator::Macd { fast, slow, signal } => {
                let m = macd::calculate_macd(candles, fast, slow, signal);
                IndicatorSeries::Macd {
                    line: m.line,
                    signal: m.signal,
                    histogram: m.histogram,
                }
            }
            Indicator::Bbands {
                period,
                stddev_mult_x100,
            } => {
                let b = volatility::calculate_bbands(candles, period, stddev_mult_x100);
                IndicatorSeries::Bands {
                    upper: b.upper,
                    middle: b.middle,
                    lower: b.lower,
                }
            }
            Indicator::Stochastic { k_period, d_period } => {
                let (k, d) = momentum::calculate_stochastic(candles, k_period, d_period);
                IndicatorSeries::Stochastic { k, d }
            }
            Indicator::Supertrend { period, mult_x100 } => {
                let s = volatility::calculate_supertrend(candles, period, mult_x100);
                IndicatorSeries::Supertrend {
                    trend: s.trend,
                    upper: s.upper,
                    lower: s.lower,
                }
            }
            Indicator::Ichimoku {
                tenkan,
                kijun,
                senkou,
            } => {
                let i = ichimoku::calculate_ichimoku(candles, tenkan, kijun, senkou);
                IndicatorSeries::Ichimoku {
                    tenkan: i.tenkan,
                    kijun: i.kijun,
                    senkou_a: i.senkou_a,
                    senkou_b: i.senkou_b,
                    chikou: i.chikou,
                }
            }
            Indicator::SwingHigh { strength } => self.swing_indicator(strength, SwingKind::High),
            Indicator::SwingLow { strength } => self.swing_indicator(strength, SwingKind::Low),
            Indicator::AllTimeHigh => IndicatorSeries::Simple(swing::calculate_all_time_high(candles)),
            Indicator::AllTimeLow => IndicatorSeries::Simple(swing::calculate_all_time_low(candles)),
            Indicator::ResistanceRay { lookback, skip } => {
                self.ray_indicator(RayKind::Resistance, lookback, skip)
            }
            Indicator::SupportRay { lookback, skip } => {
                self.ray_indicator(RayKind::Support, lookback, skip)
            }
            Indicator::VolumeProfile { session, bins } => {
                let p = volume_profile::calculate_volume_profile(
                    candles,
                    session,
                    bins,
                    self.config.value_area_pct,
                );
                IndicatorSeries::Profile {
                    poc: p.poc,
                    vah: p.vah,
                    val: p.val,
                }
            }
        }
    }

    fn swings(&self, strength: usize) -> Arc<Vec<SwingPoint>> {
        self.swings.get_or_compute(&strength, || {
            tracing::debug!(strength, bars = self.len(), "materializing swing points");
            swing::detect_swings(self.candles(), strength)
        })
    }

    fn swing_indicator(&self, strength: usize, kind: SwingKind) -> IndicatorSeries {
        let points = self.swings(strength);
        let s = swing::swing_series(self.len(), &points, kind);
        IndicatorSeries::Swing {
            price: s.price,
            dominance: s.dominance,
            bars_since: s.bars_since,
        }
    }

    /// Rays anchor on the swings of the configured strength.
    fn ray_indicator(&self, kind: RayKind, lookback: usize, skip: usize) -> IndicatorSeries {
        let points = self.swings(self.config.swing_strength.max(1));
        let r = rays::calculate_rays(self.candles(), &points, kind, lookback, skip);
        IndicatorSeries::Ray {
            price: r.price,
            slope: r.slope,
            broken: r.broken,
        }
    }

    /// Swing highs and lows with dominance, shared by every swing consumer.
    pub fn swing_points(&self, strength: usize) -> Result<Arc<Vec<SwingPoint>>, LibraryError> {
        if strength == 0 {
            return Err(invalid("SWING", "strength must be at least 1"));
        }
        Ok(self.swings(strength))
    }

    /// Swing high at the configured strength.
    pub fn swing_high(&self) -> Indicator {
        Indicator::SwingHigh {
            strength: self.config.swing_strength,
        }
    }

    pub fn swing_low(&self) -> Indicator {
        Indicator::SwingLow {
            strength: self.config.swing_strength,
        }
    }

    /// Resistance ray skipping the configured number of recent bars.
    pub fn resistance_ray(&self, lookback: usize) -> Indicator {
        Indicator::ResistanceRay {
            lookback,
            skip: self.config.default_ray_skip,
        }
    }

    pub fn support_ray(&self, lookback: usize) -> Indicator {
        Indicator::SupportRay {
            lookback,
            skip: self.config.default_ray_skip,
        }
    }

    /// Volume profile with the configured bin count.
    pub fn volume_profile(&self, session: ProfileSession) -> Indicator {
        Indicator::VolumeProfile {
            session,
            bins: self.config.profile_bins,
        }
    }

    pub fn price(&self, field: PriceField, bar: usize) -> f64 {
        let Some(c) = self.market.candles.get(bar) else {
            return f64::NAN;
        };
        match field {
            PriceField::Open => c.open,
            PriceField::High => c.high,
            PriceField::Low => c.low,
            PriceField::Close => c.close,
            PriceField::Volume => c.volume,
            PriceField::Hl2 => (c.high + c.low) / 2.0,
            PriceField::Hlc3 => c.typical_price(),
            PriceField::Ohlc4 => (c.open + c.high + c.low + c.close) / 4.0,
        }
    }

    pub fn timestamp(&self, bar: usize) -> Option<DateTime<Utc>> {
        self.market.candles.get(bar).map(|c| c.timestamp)
    }

    pub fn time_field(&self, field: TimeField, bar: usize) -> f64 {
        self.timestamp(bar)
            .map_or(f64::NAN, |ts| calendar::time_field(ts, field))
    }

    pub fn astro_field(&self, field: AstroField, bar: usize) -> f64 {
        self.timestamp(bar)
            .map_or(f64::NAN, |ts| calendar::astro_field(ts, field))
    }

    fn derived(&self, key: DerivedKey, compute: impl FnOnce() -> Vec<f64>) -> Arc<Vec<f64>> {
        self.derived.get_or_compute(&key, || {
            tracing::debug!(key = ?key, bars = self.len(), "materializing derived series");
            compute()
        })
    }

    /// Highest high of the `period` bars before `bar`.
    pub fn high_of(&self, period: usize, bar: usize) -> Result<f64, LibraryError> {
        if period == 0 {
            return Err(invalid("HIGH_OF", "period must be at least 1"));
        }
        let values = self.derived(DerivedKey::HighOf(period), || {
            window::calculate_high_of(self.candles(), period)
        });
        Ok(at(&values, bar))
    }

    /// Lowest low of the `period` bars before `bar`.
    pub fn low_of(&self, period: usize, bar: usize) -> Result<f64, LibraryError> {
        if period == 0 {
            return Err(invalid("LOW_OF", "period must be at least 1"));
        }
        let values = self.derived(DerivedKey::LowOf(period), || {
            window::calculate_low_of(self.candles(), period)
        });
        Ok(at(&values, bar))
    }

    pub fn range_position(&self, period: usize, skip: usize, bar: usize) -> Result<f64, LibraryError> {
        if period == 0 {
            return Err(invalid("RANGE_POSITION", "period must be at least 1"));
        }
        let values = self.derived(DerivedKey::RangePosition { period, skip }, || {
            window::calculate_range_position(self.candles(), period, skip)
        });
        Ok(at(&values, bar))
    }

    fn flow(&self) -> &FlowSeries {
        self.flow.get_or_init(|| {
            tracing::debug!(bars = self.len(), "materializing order flow");
            Arc::new(orderflow::calculate_flow(&self.market))
        })
    }

    pub fn orderflow(&self, field: OrderflowField, bar: usize) -> f64 {
        if field == OrderflowField::FundingRate {
            let funding = self.derived(DerivedKey::Funding, || {
                orderflow::calculate_funding(&self.market)
            });
            return at(&funding, bar);
        }
        let flow = self.flow();
        match field {
            OrderflowField::Delta => at(&flow.delta, bar),
            OrderflowField::Cvd => at(&flow.cvd, bar),
            OrderflowField::BuyVolume => at(&flow.buy_volume, bar),
            OrderflowField::SellVolume => at(&flow.sell_volume, bar),
            OrderflowField::TradeCount => at(&flow.trade_count, bar),
            OrderflowField::FundingRate => f64::NAN,
        }
    }

    pub fn exchange_delta(&self, exchange: &str, bar: usize) -> f64 {
        let key = DerivedKey::ExchangeDelta(exchange.to_ascii_lowercase());
        let values = self.derived(key, || {
            orderflow::calculate_exchange_delta(&self.market, exchange)
        });
        at(&values, bar)
    }

    pub fn combined_delta(&self, bar: usize) -> f64 {
        let values = self.derived(DerivedKey::CombinedDelta, || {
            orderflow::calculate_combined_delta(&self.market)
        });
        at(&values, bar)
    }

    pub fn delta_divergence(&self, threshold: Option<f64>, bar: usize) -> Result<bool, LibraryError> {
        let threshold = threshold.unwrap_or(self.config.divergence_threshold);
        if threshold.is_nan() || threshold < 0.0 {
            return Err(invalid("DELTA_DIVERGENCE", "threshold must be non-negative"));
        }
        let values = self.derived(DerivedKey::Divergence(threshold.to_bits()), || {
            bool_column(orderflow::calculate_delta_divergence(&self.market, threshold))
        });
        Ok(at(&values, bar) > 0.5)
    }

    fn footprint(&self) -> &[Option<FootprintBar>] {
        self.footprint.get_or_init(|| {
            tracing::debug!(trades = self.market.trades.len(), "materializing footprint");
            Arc::new(footprint::calculate_footprint(
                &self.market,
                self.config.footprint_tick_size,
                self.config.value_area_pct,
            ))
        })
    }

    /// Price of a footprint level; undefined for bars without trades.
    pub fn footprint_level(&self, level: FootprintLevel, bar: usize) -> f64 {
        match self.footprint().get(bar) {
            Some(Some(fp)) => fp.level(level).price,
            _ => f64::NAN,
        }
    }

    pub fn imbalance(
        &self,
        level: FootprintLevel,
        ratio: Option<f64>,
        bar: usize,
    ) -> Result<bool, LibraryError> {
        let ratio = ratio.unwrap_or(self.config.imbalance_ratio);
        if ratio.is_nan() || ratio < 1.0 {
            return Err(invalid("IMBALANCE", "ratio must be at least 1"));
        }
        Ok(match self.footprint().get(bar) {
            Some(Some(fp)) => fp.level(level).is_imbalanced(ratio),
            _ => false,
        })
    }

    pub fn absorption(
        &self,
        volume_ratio: Option<f64>,
        move_pct: Option<f64>,
        bar: usize,
    ) -> Result<bool, LibraryError> {
        let volume_ratio = volume_ratio.unwrap_or(self.config.absorption_volume_ratio);
        let move_pct = move_pct.unwrap_or(self.config.absorption_move_pct);
        if volume_ratio.is_nan() || volume_ratio <= 0.0 {
            return Err(invalid("ABSORPTION", "volume ratio must be positive"));
        }
        if move_pct.is_nan() || move_pct < 0.0 {
            return Err(invalid("ABSORPTION", "move percent must be non-negative"));
        }
        let key = DerivedKey::Absorption {
            volume_ratio: volume_ratio.to_bits(),
            move_pct: move_pct.to_bits(),
        };
        let lookback = self.config.absorption_lookback;
        let values = self.derived(key, || {
            bool_column(footprint::calculate_absorption(
                self.candles(),
                lookback,
                volume_ratio,
                move_pct,
            ))
        });
        Ok(at(&values, bar) > 0.5)
    }
}

fn invalid(indicator: impl Into<String>, reason: impl Into<String>) -> LibraryError {
    LibraryError::InvalidParameter {
        indicator: indicator.into(),
        reason: reason.into(),
    }
}

/// Rejects parameter sets that cannot produce a meaningful series.
fn validate(indicator: &Indicator) -> Result<(), LibraryError> {
    let positive = |value: usize, what: &str| {
        if value == 0 {
            Err(invalid(indicator.to_string(), format!("{what} must be at least 1")))
        } else {
            Ok(())
        }
    };
    match *indicator {
        Indicator::Sma(p)
        | Indicator::Ema(p)
        | Indicator::Wma(p)
        | Indicator::Rsi(p)
        | Indicator::Roc(p)
        | Indicator::Atr(p)
        | Indicator::Stddev(p) => positive(p, "period"),
        Indicator::Obv | Indicator::Vwap | Indicator::AllTimeHigh | Indicator::AllTimeLow => Ok(()),
        Indicator::Macd { fast, slow, signal } => {
            positive(fast, "fast period")?;
            positive(slow, "slow period")?;
            positive(signal, "signal period")
        }
        Indicator::Bbands { period, .. } | Indicator::Supertrend { period, .. } => {
            positive(period, "period")
        }
        Indicator::Stochastic { k_period, d_period } => {
            positive(k_period, "k period")?;
            positive(d_period, "d period")
        }
        Indicator::Ichimoku {
            tenkan,
            kijun,
            senkou,
        } => {
            positive(tenkan, "tenkan period")?;
            positive(kijun, "kijun period")?;
            positive(senkou, "senkou period")
        }
        Indicator::SwingHigh { strength } | Indicator::SwingLow { strength } => {
            positive(strength, "strength")
        }
        Indicator::ResistanceRay { lookback, .. } | Indicator::SupportRay { lookback, .. } => {
            positive(lookback, "lookback")
        }
        Indicator::VolumeProfile { session, bins } => {
            positive(bins, "bins")?;
            match session {
                ProfileSession::Rolling(n) => positive(n, "session length"),
                ProfileSession::Daily => Ok(()),
            }
        }
    }
}
