//! Technical, structural and orderflow indicator implementations.
//!
//! This module provides the identity and output shapes shared by every
//! indicator family:
//! - `Indicator`: closed enum of indicator identity + parameters (cache key)
//! - `Property`: named sub-output of a multi-output indicator
//! - `IndicatorSeries`: whole-array result, aligned 1:1 with the candles
//! - `IndicatorValue`: point-in-time result read out of a series
//!
//! Arrays use NaN as the undefined sentinel for warmup bars.

pub mod calendar;
pub mod footprint;
pub mod ichimoku;
pub mod macd;
pub mod momentum;
pub mod moving_average;
pub mod orderflow;
pub mod rays;
pub mod swing;
pub mod volatility;
pub mod volume;
pub mod volume_profile;
pub mod window;

use crate::domain::ast::Value;
use std::fmt;

/// Session over which a volume profile accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProfileSession {
    /// The last `n` bars, including the current one.
    Rolling(usize),
    /// All bars since the most recent UTC midnight.
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Indicator {
    Sma(usize),
    Ema(usize),
    Wma(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Stddev(usize),
    Obv,
    Vwap,
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bbands {
        period: usize,
        stddev_mult_x100: u32,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Supertrend {
        period: usize,
        mult_x100: u32,
    },
    Ichimoku {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
    },
    SwingHigh {
        strength: usize,
    },
    SwingLow {
        strength: usize,
    },
    AllTimeHigh,
    AllTimeLow,
    ResistanceRay {
        lookback: usize,
        skip: usize,
    },
    SupportRay {
        lookback: usize,
        skip: usize,
    },
    VolumeProfile {
        session: ProfileSession,
        bins: usize,
    },
}

impl Indicator {
    /// Named outputs, empty for single-valued indicators.
    pub fn properties(&self) -> &'static [Property] {
        use Property::*;
        match self {
            Indicator::Macd { .. } => &[Line, Signal, Histogram],
            Indicator::Bbands { .. } => &[Upper, Middle, Lower, Width],
            Indicator::Stochastic { .. } => &[K, D],
            Indicator::Supertrend { .. } => &[Trend, Upper, Lower],
            Indicator::Ichimoku { .. } => &[Tenkan, Kijun, SenkouA, SenkouB, Chikou],
            Indicator::SwingHigh { .. } | Indicator::SwingLow { .. } => {
                &[Price, Dominance, BarsSince]
            }
            Indicator::ResistanceRay { .. } | Indicator::SupportRay { .. } => {
                &[Price, Broken, Crossed, Distance, Slope]
            }
            Indicator::VolumeProfile { .. } => &[Poc, Vah, Val],
            _ => &[],
        }
    }

    pub fn is_multi_output(&self) -> bool {
        !self.properties().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Property {
    Line,
    Signal,
    Histogram,
    Upper,
    Middle,
    Lower,
    Width,
    K,
    D,
    Trend,
    Tenkan,
    Kijun,
    SenkouA,
    SenkouB,
    Chikou,
    Price,
    Dominance,
    BarsSince,
    Broken,
    Crossed,
    Distance,
    Slope,
    Poc,
    Vah,
    Val,
}

impl Property {
    /// Whether this property yields a boolean rather than a number.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Property::Broken | Property::Crossed)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Property::Line => "line",
            Property::Signal => "signal",
            Property::Histogram => "histogram",
            Property::Upper => "upper",
            Property::Middle => "middle",
            Property::Lower => "lower",
            Property::Width => "width",
            Property::K => "k",
            Property::D => "d",
            Property::Trend => "trend",
            Property::Tenkan => "tenkan",
            Property::Kijun => "kijun",
            Property::SenkouA => "senkou_a",
            Property::SenkouB => "senkou_b",
            Property::Chikou => "chikou",
            Property::Price => "price",
            Property::Dominance => "dominance",
            Property::BarsSince => "bars_since",
            Property::Broken => "broken",
            Property::Crossed => "crossed",
            Property::Distance => "distance",
            Property::Slope => "slope",
            Property::Poc => "poc",
            Property::Vah => "vah",
            Property::Val => "val",
        };
        f.write_str(name)
    }
}

/// Whole-array indicator output; every vector has one entry per candle.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorSeries {
    Simple(Vec<f64>),
    Macd {
        line: Vec<f64>,
        signal: Vec<f64>,
        histogram: Vec<f64>,
    },
    Bands {
        upper: Vec<f64>,
        middle: Vec<f64>,
        lower: Vec<f64>,
    },
    Stochastic {
        k: Vec<f64>,
        d: Vec<f64>,
    },
    Supertrend {
        trend: Vec<f64>,
        upper: Vec<f64>,
        lower: Vec<f64>,
    },
    Ichimoku {
        tenkan: Vec<f64>,
        kijun: Vec<f64>,
        senkou_a: Vec<f64>,
        senkou_b: Vec<f64>,
        chikou: Vec<f64>,
    },
    Swing {
        price: Vec<f64>,
        dominance: Vec<f64>,
        bars_since: Vec<f64>,
    },
    Ray {
        price: Vec<f64>,
        slope: Vec<f64>,
        broken: Vec<bool>,
    },
    Profile {
        poc: Vec<f64>,
        vah: Vec<f64>,
        val: Vec<f64>,
    },
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        match self {
            IndicatorSeries::Simple(v) => v.len(),
            IndicatorSeries::Macd { line, .. } => line.len(),
            IndicatorSeries::Bands { middle, .. } => middle.len(),
            IndicatorSeries::Stochastic { k, .. } => k.len(),
            IndicatorSeries::Supertrend { trend, .. } => trend.len(),
            IndicatorSeries::Ichimoku { tenkan, .. } => tenkan.len(),
            IndicatorSeries::Swing { price, .. } => price.len(),
            IndicatorSeries::Ray { price, .. } => price.len(),
            IndicatorSeries::Profile { poc, .. } => poc.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point read at `bar`; out-of-range bars read as undefined. `close` is
    /// the bar's close, which ray distance is measured from.
    pub fn value_at(&self, bar: usize, close: f64) -> IndicatorValue {
        let at = |values: &[f64]| values.get(bar).copied().unwrap_or(f64::NAN);
        match self {
            IndicatorSeries::Simple(v) => IndicatorValue::Simple(at(v)),
            IndicatorSeries::Macd {
                line,
                signal,
                histogram,
            } => IndicatorValue::Macd {
                line: at(line),
                signal: at(signal),
                histogram: at(histogram),
            },
            IndicatorSeries::Bands {
                upper,
                middle,
                lower,
            } => IndicatorValue::Bands {
                upper: at(upper),
                middle: at(middle),
                lower: at(lower),
                width: at(upper) - at(lower),
            },
            IndicatorSeries::Stochastic { k, d } => IndicatorValue::Stochastic {
                k: at(k),
                d: at(d),
            },
            IndicatorSeries::Supertrend {
                trend,
                upper,
                lower,
            } => IndicatorValue::Supertrend {
                trend: at(trend),
                upper: at(upper),
                lower: at(lower),
            },
            IndicatorSeries::Ichimoku {
                tenkan,
                kijun,
                senkou_a,
                senkou_b,
                chikou,
            } => IndicatorValue::Ichimoku {
                tenkan: at(tenkan),
                kijun: at(kijun),
                senkou_a: at(senkou_a),
                senkou_b: at(senkou_b),
                chikou: at(chikou),
            },
            IndicatorSeries::Swing {
                price,
                dominance,
                bars_since,
            } => IndicatorValue::Swing {
                price: at(price),
                dominance: at(dominance),
                bars_since: at(bars_since),
            },
            IndicatorSeries::Ray {
                price,
                slope,
                broken,
            } => {
                let projected = at(price);
                // a zero projection has no percentage gap
                let distance = if projected == 0.0 {
                    f64::NAN
                } else {
                    (close - projected) / projected * 100.0
                };
                let is_broken = broken.get(bar).copied().unwrap_or(false);
                let was_broken = bar > 0 && broken.get(bar - 1).copied().unwrap_or(false);
                IndicatorValue::Ray {
                    price: projected,
                    broken: is_broken,
                    crossed: is_broken && !was_broken,
                    distance,
                    slope: at(slope),
                }
            }
            IndicatorSeries::Profile { poc, vah, val } => IndicatorValue::Profile {
                poc: at(poc),
                vah: at(vah),
                val: at(val),
            },
        }
    }

    /// Named columns, in `Indicator::properties` order (or `value` for
    /// single-output series). Boolean columns are encoded as 1.0 / 0.0.
    pub fn columns(&self) -> Vec<(&'static str, Vec<f64>)> {
        match self {
            IndicatorSeries::Simple(v) => vec![("value", v.clone())],
            IndicatorSeries::Macd {
                line,
                signal,
                histogram,
            } => vec![
                ("line", line.clone()),
                ("signal", signal.clone()),
                ("histogram", histogram.clone()),
            ],
            IndicatorSeries::Bands {
                upper,
                middle,
                lower,
            } => {
                let width = upper.iter().zip(lower).map(|(u, l)| u - l).collect();
                vec![
                    ("upper", upper.clone()),
                    ("middle", middle.clone()),
                    ("lower", lower.clone()),
                    ("width", width),
                ]
            }
            IndicatorSeries::Stochastic { k, d } => vec![("k", k.clone()), ("d", d.clone())],
            IndicatorSeries::Supertrend {
                trend,
                upper,
                lower,
            } => vec![
                ("trend", trend.clone()),
                ("upper", upper.clone()),
                ("lower", lower.clone()),
            ],
            IndicatorSeries::Ichimoku {
                tenkan,
                kijun,
                senkou_a,
                senkou_b,
                chikou,
            } => vec![
                ("tenkan", tenkan.clone()),
                ("kijun", kijun.clone()),
                ("senkou_a", senkou_a.clone()),
                ("senkou_b", senkou_b.clone()),
                ("chikou", chikou.clone()),
            ],
            IndicatorSeries::Swing {
                price,
                dominance,
                bars_since,
            } => vec![
                ("price", price.clone()),
                ("dominance", dominance.clone()),
                ("bars_since", bars_since.clone()),
            ],
            IndicatorSeries::Ray {
                price,
                slope,
                broken,
            } => vec![
                ("price", price.clone()),
                (
                    "broken",
                    broken.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
                ),
                ("slope", slope.clone()),
            ],
            IndicatorSeries::Profile { poc, vah, val } => vec![
                ("poc", poc.clone()),
                ("vah", vah.clone()),
                ("val", val.clone()),
            ],
        }
    }
}

/// Point-in-time indicator result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bands {
        upper: f64,
        middle: f64,
        lower: f64,
        width: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Supertrend {
        trend: f64,
        upper: f64,
        lower: f64,
    },
    Ichimoku {
        tenkan: f64,
        kijun: f64,
        senkou_a: f64,
        senkou_b: f64,
        chikou: f64,
    },
    Swing {
        price: f64,
        dominance: f64,
        bars_since: f64,
    },
    Ray {
        price: f64,
        broken: bool,
        crossed: bool,
        distance: f64,
        slope: f64,
    },
    Profile {
        poc: f64,
        vah: f64,
        val: f64,
    },
}

impl IndicatorValue {
    /// Reads one output. `None` selects the value of a single-output
    /// indicator; a mismatched combination returns `None`.
    pub fn field(&self, property: Option<Property>) -> Option<Value> {
        use Property as P;
        let number = match (self, property) {
            (IndicatorValue::Simple(v), None) => *v,
            (IndicatorValue::Macd { line, .. }, Some(P::Line)) => *line,
            (IndicatorValue::Macd { signal, .. }, Some(P::Signal)) => *signal,
            (IndicatorValue::Macd { histogram, .. }, Some(P::Histogram)) => *histogram,
            (IndicatorValue::Bands { upper, .. }, Some(P::Upper)) => *upper,
            (IndicatorValue::Bands { middle, .. }, Some(P::Middle)) => *middle,
            (IndicatorValue::Bands { lower, .. }, Some(P::Lower)) => *lower,
            (IndicatorValue::Bands { width, .. }, Some(P::Width)) => *width,
            (IndicatorValue::Stochastic { k, .. }, Some(P::K)) => *k,
            (IndicatorValue::Stochastic { d, .. }, Some(P::D)) => *d,
            (IndicatorValue::Supertrend { trend, .. }, Some(P::Trend)) => *trend,
            (IndicatorValue::Supertrend { upper, .. }, Some(P::Upper)) => *upper,
            (IndicatorValue::Supertrend { lower, .. }, Some(P::Lower)) => *lower,
            (IndicatorValue::Ichimoku { tenkan, .. }, Some(P::Tenkan)) => *tenkan,
            (IndicatorValue::Ichimoku { kijun, .. }, Some(P::Kijun)) => *kijun,
            (IndicatorValue::Ichimoku { senkou_a, .. }, Some(P::SenkouA)) => *senkou_a,
            (IndicatorValue::Ichimoku { senkou_b, .. }, Some(P::SenkouB)) => *senkou_b,
            (IndicatorValue::Ichimoku { chikou, .. }, Some(P::Chikou)) => *chikou,
            (IndicatorValue::Swing { price, .. }, Some(P::Price)) => *price,
            (IndicatorValue::Swing { dominance, .. }, Some(P::Dominance)) => *dominance,
            (IndicatorValue::Swing { bars_since, .. }, Some(P::BarsSince)) => *bars_since,
            (IndicatorValue::Ray { price, .. }, Some(P::Price)) => *price,
            (IndicatorValue::Ray { distance, .. }, Some(P::Distance)) => *distance,
            (IndicatorValue::Ray { slope, .. }, Some(P::Slope)) => *slope,
            (IndicatorValue::Ray { broken, .. }, Some(P::Broken)) => {
                return Some(Value::Bool(*broken));
            }
            (IndicatorValue::Ray { crossed, .. }, Some(P::Crossed)) => {
                return Some(Value::Bool(*crossed));
            }
            (IndicatorValue::Profile { poc, .. }, Some(P::Poc)) => *poc,
            (IndicatorValue::Profile { vah, .. }, Some(P::Vah)) => *vah,
            (IndicatorValue::Profile { val, .. }, Some(P::Val)) => *val,
            _ => return None,
        };
        Some(Value::Number(number))
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Sma(period) => write!(f, "SMA({})", period),
            Indicator::Ema(period) => write!(f, "EMA({})", period),
            Indicator::Wma(period) => write!(f, "WMA({})", period),
            Indicator::Rsi(period) => write!(f, "RSI({})", period),
            Indicator::Roc(period) => write!(f, "ROC({})", period),
            Indicator::Atr(period) => write!(f, "ATR({})", period),
            Indicator::Stddev(period) => write!(f, "STDDEV({})", period),
            Indicator::Obv => write!(f, "OBV"),
            Indicator::Vwap => write!(f, "VWAP"),
            Indicator::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            Indicator::Bbands {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BBANDS({},{})", period, mult)
            }
            Indicator::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            Indicator::Supertrend { period, mult_x100 } => {
                let mult = *mult_x100 as f64 / 100.0;
                write!(f, "SUPERTREND({},{})", period, mult)
            }
            Indicator::Ichimoku {
                tenkan,
                kijun,
                senkou,
            } => write!(f, "ICHIMOKU({},{},{})", tenkan, kijun, senkou),
            Indicator::SwingHigh { strength } => write!(f, "SWING_HIGH({})", strength),
            Indicator::SwingLow { strength } => write!(f, "SWING_LOW({})", strength),
            Indicator::AllTimeHigh => write!(f, "ATH"),
            Indicator::AllTimeLow => write!(f, "ATL"),
            Indicator::ResistanceRay { lookback, skip } => {
                write!(f, "RESISTANCE_RAY({},{})", lookback, skip)
            }
            Indicator::SupportRay { lookback, skip } => {
                write!(f, "SUPPORT_RAY({},{})", lookback, skip)
            }
            Indicator::VolumeProfile { session, bins } => match session {
                ProfileSession::Rolling(n) => write!(f, "VOLUME_PROFILE({},{})", n, bins),
                ProfileSession::Daily => write!(f, "VOLUME_PROFILE(DAILY,{})", bins),
            },
        }
    }
}
