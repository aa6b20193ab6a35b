//! Condition AST.
//!
//! Every node kind and function family is a closed variant, so an unknown
//! function cannot be expressed. Condition-shaped nodes produce
//! `Value::Bool`, everything else `Value::Number`; `Expr::value_type` gives
//! the static type of a node.

use crate::domain::indicator::calendar::{AstroField, TimeField};
use crate::domain::indicator::footprint::FootprintLevel;
use crate::domain::indicator::{Indicator, Property};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
        }
    }

    /// The number, or `None` for a boolean.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    Boolean,
    Number,
}

impl ValueType {
    /// Value read where history is missing.
    pub fn undefined(self) -> Value {
        match self {
            ValueType::Boolean => Value::Bool(false),
            ValueType::Number => Value::Number(f64::NAN),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Number => write!(f, "number"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// (high + low) / 2
    Hl2,
    /// (high + low + close) / 3
    Hlc3,
    /// (open + high + low + close) / 4
    Ohlc4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    /// Equal within an absolute tolerance.
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrossDirection {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Windowed price functions over the bars before the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RangeFunction {
    HighOf { period: usize },
    LowOf { period: usize },
    /// Where the close sits in the high/low range of `period` bars ending
    /// `skip` bars before the current one, 0 to 100.
    RangePosition { period: usize, skip: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AggregateFunction {
    Lowest,
    Highest,
    Percentile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrderflowField {
    Delta,
    Cvd,
    BuyVolume,
    SellVolume,
    TradeCount,
    FundingRate,
}

/// Optional arguments fall back to the library configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FootprintFunction {
    Level(FootprintLevel),
    Imbalance {
        level: FootprintLevel,
        ratio: Option<f64>,
    },
    Absorption {
        volume_ratio: Option<f64>,
        move_pct: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExchangeFunction {
    Delta(String),
    CombinedDelta,
    Divergence { threshold: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Price(PriceField),
    Comparison {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cross {
        direction: CrossDirection,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Inclusive on both bounds.
    Between {
        expr: Box<Expr>,
        lower: Box<Expr>,
        upper: Box<Expr>,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Indicator {
        indicator: Indicator,
        property: Option<Property>,
    },
    Range(RangeFunction),
    Aggregate {
        function: AggregateFunction,
        expr: Box<Expr>,
        period: usize,
    },
    /// `expr[offset]`: `expr` evaluated `offset` bars back.
    Lookback {
        expr: Box<Expr>,
        offset: usize,
    },
    Time(TimeField),
    Astro(AstroField),
    Orderflow(OrderflowField),
    Footprint(FootprintFunction),
    Exchange(ExchangeFunction),
}

impl Expr {
    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Bool(_)
            | Expr::Comparison { .. }
            | Expr::Cross { .. }
            | Expr::Logical { .. }
            | Expr::Not(_)
            | Expr::Between { .. } => ValueType::Boolean,
            Expr::Indicator {
                property: Some(property),
                ..
            } if property.is_boolean() => ValueType::Boolean,
            Expr::Footprint(FootprintFunction::Imbalance { .. })
            | Expr::Footprint(FootprintFunction::Absorption { .. })
            | Expr::Exchange(ExchangeFunction::Divergence { .. }) => ValueType::Boolean,
            Expr::Lookback { expr, .. } => expr.value_type(),
            _ => ValueType::Number,
        }
    }

    pub fn number(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn price(field: PriceField) -> Self {
        Expr::Price(field)
    }

    pub fn close() -> Self {
        Expr::Price(PriceField::Close)
    }

    pub fn indicator(indicator: Indicator) -> Self {
        Expr::Indicator {
            indicator,
            property: None,
        }
    }

    pub fn property(indicator: Indicator, property: Property) -> Self {
        Expr::Indicator {
            indicator,
            property: Some(property),
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn cross(direction: CrossDirection, left: Expr, right: Expr) -> Self {
        Expr::Cross {
            direction,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn arith(op: ArithOp, left: Expr, right: Expr) -> Self {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn aggregate(function: AggregateFunction, expr: Expr, period: usize) -> Self {
        Expr::Aggregate {
            function,
            expr: Box::new(expr),
            period,
        }
    }

    pub fn lookback(expr: Expr, offset: usize) -> Self {
        Expr::Lookback {
            expr: Box::new(expr),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_nodes_are_boolean() {
        let expr = Expr::gt(Expr::close(), Expr::number(10.0));
        assert_eq!(expr.value_type(), ValueType::Boolean);
        assert_eq!(Expr::close().value_type(), ValueType::Number);
    }

    #[test]
    fn boolean_ray_properties() {
        let ray = Indicator::ResistanceRay {
            lookback: 50,
            skip: 1,
        };
        assert_eq!(
            Expr::property(ray, Property::Broken).value_type(),
            ValueType::Boolean
        );
        assert_eq!(
            Expr::property(ray, Property::Distance).value_type(),
            ValueType::Number
        );
    }

    #[test]
    fn lookback_inherits_inner_type() {
        let cond = Expr::lookback(Expr::gt(Expr::close(), Expr::number(1.0)), 2);
        assert_eq!(cond.value_type(), ValueType::Boolean);
        assert_eq!(cond.value_type().undefined(), Value::Bool(false));

        let num = Expr::lookback(Expr::close(), 2);
        assert!(num.value_type().undefined().as_number().unwrap().is_nan());
    }

    #[test]
    fn flow_family_types() {
        assert_eq!(
            Expr::Exchange(ExchangeFunction::Divergence { threshold: None }).value_type(),
            ValueType::Boolean
        );
        assert_eq!(
            Expr::Footprint(FootprintFunction::Level(FootprintLevel::Poc)).value_type(),
            ValueType::Number
        );
        assert_eq!(
            Expr::Orderflow(OrderflowField::Cvd).value_type(),
            ValueType::Number
        );
    }

    #[test]
    fn value_type_display() {
        assert_eq!(ValueType::Boolean.to_string(), "boolean");
        assert_eq!(ValueType::Number.to_string(), "number");
    }
}
