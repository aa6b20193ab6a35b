//! Page identity: what is computed, for which series and time range.

use crate::domain::candle::Timeframe;
use crate::domain::indicator::{Indicator, ProfileSession};
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Raw OHLCV columns.
    Candles,
    Indicator(Indicator),
}

/// One canonicalized parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    Int(i64),
    /// IEEE-754 bits; -0.0 and every NaN are folded before encoding.
    Float(u64),
    Text(String),
}

impl ParamValue {
    pub fn float(value: f64) -> Self {
        let canonical = if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        };
        ParamValue::Float(canonical.to_bits())
    }

    pub fn int(value: impl Into<i64>) -> Self {
        ParamValue::Int(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Text(value.into())
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// Ordered list of tagged primitives. The tags keep `Int(1)`,
/// `Float(1.0)` and `Text("1")` distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey(Vec<ParamValue>);

impl ParamKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, value: ParamValue) -> Self {
        self.0.push(value);
        self
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }

    /// Canonical parameters of an indicator, name first.
    pub fn of_indicator(indicator: &Indicator) -> Self {
        let name = |n: &str| ParamKey::new().push(ParamValue::text(n));
        match *indicator {
            Indicator::Sma(p) => name("SMA").push(p.into()),
            Indicator::Ema(p) => name("EMA").push(p.into()),
            Indicator::Wma(p) => name("WMA").push(p.into()),
            Indicator::Rsi(p) => name("RSI").push(p.into()),
            Indicator::Roc(p) => name("ROC").push(p.into()),
            Indicator::Atr(p) => name("ATR").push(p.into()),
            Indicator::Stddev(p) => name("STDDEV").push(p.into()),
            Indicator::Obv => name("OBV"),
            Indicator::Vwap => name("VWAP"),
            Indicator::Macd { fast, slow, signal } => name("MACD")
                .push(fast.into())
                .push(slow.into())
                .push(signal.into()),
            Indicator::Bbands {
                period,
                stddev_mult_x100,
            } => name("BBANDS")
                .push(period.into())
                .push(ParamValue::int(stddev_mult_x100)),
            Indicator::Stochastic { k_period, d_period } => name("STOCHASTIC")
                .push(k_period.into())
                .push(d_period.into()),
            Indicator::Supertrend { period, mult_x100 } => name("SUPERTREND")
                .push(period.into())
                .push(ParamValue::int(mult_x100)),
            Indicator::Ichimoku {
                tenkan,
                kijun,
                senkou,
            } => name("ICHIMOKU")
                .push(tenkan.into())
                .push(kijun.into())
                .push(senkou.into()),
            Indicator::SwingHigh { strength } => name("SWING_HIGH").push(strength.into()),
            Indicator::SwingLow { strength } => name("SWING_LOW").push(strength.into()),
            Indicator::AllTimeHigh => name("ATH"),
            Indicator::AllTimeLow => name("ATL"),
            Indicator::ResistanceRay { lookback, skip } => name("RESISTANCE_RAY")
                .push(lookback.into())
                .push(skip.into()),
            Indicator::SupportRay { lookback, skip } => name("SUPPORT_RAY")
                .push(lookback.into())
                .push(skip.into()),
            Indicator::VolumeProfile { session, bins } => {
                let session = match session {
                    ProfileSession::Rolling(n) => ParamValue::from(n),
                    ProfileSession::Daily => ParamValue::text("DAILY"),
                };
                name("VOLUME_PROFILE").push(session).push(bins.into())
            }
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match value {
                ParamValue::Int(v) => write!(f, "i:{}", v)?,
                ParamValue::Float(bits) => write!(f, "f:{}", f64::from_bits(*bits))?,
                ParamValue::Text(s) => write!(f, "s:{:?}", s)?,
            }
        }
        Ok(())
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Fields are read-only so `params` always matches `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    kind: PageKind,
    params: ParamKey,
    symbol: String,
    timeframe: Timeframe,
    range: TimeRange,
}

impl PageKey {
    /// Derives the canonical parameters from `kind`.
    pub fn new(
        kind: PageKind,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Self {
        let params = match &kind {
            PageKind::Candles => ParamKey::new(),
            PageKind::Indicator(indicator) => ParamKey::of_indicator(indicator),
        };
        Self {
            kind,
            params,
            symbol: symbol.into(),
            timeframe,
            range,
        }
    }

    pub fn candles(symbol: impl Into<String>, timeframe: Timeframe, range: TimeRange) -> Self {
        Self::new(PageKind::Candles, symbol, timeframe, range)
    }

    pub fn indicator(
        indicator: Indicator,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Self {
        Self::new(PageKind::Indicator(indicator), symbol, timeframe, range)
    }

    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    pub fn params(&self) -> &ParamKey {
        &self.params
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }

    pub fn covers(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.symbol == symbol && self.timeframe == timeframe
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PageKind::Candles => "CANDLES".to_string(),
            PageKind::Indicator(indicator) => indicator.to_string(),
        };
        write!(
            f,
            "{}[{}] {} {} {}..{}",
            kind,
            self.params,
            self.symbol,
            self.timeframe,
            self.range.start.timestamp(),
            self.range.end.timestamp()
        )
    }
}
