//! Condition evaluation engine.
//!
//! Evaluates an `Expr` at one bar against an `IndicatorLibrary`.
//!
//! # Evaluation Semantics
//!
//! - Comparisons with an undefined (NaN) side are `false`; `Eq` is equality
//!   within `EPSILON`
//! - Crosses need the previous bar and are `false` at bar 0
//! - `AND` short-circuits on the first `false`, `OR` on the first `true`
//! - Division by zero yields NaN
//! - `expr[n]` before the first bar yields the undefined value of the
//!   node's type (`false` or NaN)
//! - `LOWEST`/`HIGHEST`/`PERCENTILE` sample the last `period` bars
//!   including the current one, undefined until `period` bars exist
//! - A numeric node where a boolean is required (or the reverse) is a
//!   `TypeMismatch` error

use crate::domain::ast::{
    AggregateFunction, ArithOp, CompareOp, CrossDirection, ExchangeFunction, Expr,
    FootprintFunction, LogicalOp, RangeFunction, Value, ValueType,
};
use crate::domain::error::EvaluationError;
use crate::domain::library::IndicatorLibrary;

pub const EPSILON: f64 = 1e-7;

pub fn evaluate(
    expr: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
) -> Result<Value, EvaluationError> {
    let value = match expr {
        Expr::Number(v) => Value::Number(*v),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Price(field) => Value::Number(library.price(*field, bar)),
        Expr::Comparison { op, left, right } => {
            let l = number(left, library, bar, "comparison")?;
            let r = number(right, library, bar, "comparison")?;
            Value::Bool(compare(*op, l, r))
        }
        Expr::Cross {
            direction,
            left,
            right,
        } => Value::Bool(cross(*direction, left, right, library, bar)?),
        Expr::Logical { op, left, right } => {
            let l = condition(left, library, bar, "logical operand")?;
            let result = match op {
                LogicalOp::And => l && condition(right, library, bar, "logical operand")?,
                LogicalOp::Or => l || condition(right, library, bar, "logical operand")?,
            };
            Value::Bool(result)
        }
        Expr::Not(inner) => Value::Bool(!condition(inner, library, bar, "NOT")?),
        Expr::Between { expr, lower, upper } => {
            let v = number(expr, library, bar, "BETWEEN")?;
            let lo = number(lower, library, bar, "BETWEEN")?;
            let hi = number(upper, library, bar, "BETWEEN")?;
            Value::Bool(v >= lo && v <= hi)
        }
        Expr::Arithmetic { op, left, right } => {
            let l = number(left, library, bar, "arithmetic")?;
            let r = number(right, library, bar, "arithmetic")?;
            Value::Number(arithmetic(*op, l, r))
        }
        Expr::Indicator {
            indicator,
            property,
        } => {
            let point = library.value_at(indicator, bar)?;
            match point.field(*property) {
                Some(v) => v,
                None => {
                    return Err(match property {
                        None => EvaluationError::MissingProperty {
                            indicator: indicator.to_string(),
                        },
                        Some(p) => EvaluationError::UnknownProperty {
                            indicator: indicator.to_string(),
                            property: p.to_string(),
                        },
                    });
                }
            }
        }
        Expr::Range(function) => Value::Number(match *function {
            RangeFunction::HighOf { period } => library.high_of(period, bar)?,
            RangeFunction::LowOf { period } => library.low_of(period, bar)?,
            RangeFunction::RangePosition { period, skip } => {
                library.range_position(period, skip, bar)?
            }
        }),
        Expr::Aggregate {
            function,
            expr,
            period,
        } => Value::Number(aggregate(*function, expr, *period, library, bar)?),
        Expr::Lookback { expr, offset } => {
            if *offset > bar {
                expr.value_type().undefined()
            } else {
                evaluate(expr, library, bar - offset)?
            }
        }
        Expr::Time(field) => Value::Number(library.time_field(*field, bar)),
        Expr::Astro(field) => Value::Number(library.astro_field(*field, bar)),
        Expr::Orderflow(field) => Value::Number(library.orderflow(*field, bar)),
        Expr::Footprint(function) => match *function {
            FootprintFunction::Level(level) => Value::Number(library.footprint_level(level, bar)),
            FootprintFunction::Imbalance { level, ratio } => {
                Value::Bool(library.imbalance(level, ratio, bar)?)
            }
            FootprintFunction::Absorption {
                volume_ratio,
                move_pct,
            } => Value::Bool(library.absorption(volume_ratio, move_pct, bar)?),
        },
        Expr::Exchange(function) => match function {
            ExchangeFunction::Delta(name) => Value::Number(library.exchange_delta(name, bar)),
            ExchangeFunction::CombinedDelta => Value::Number(library.combined_delta(bar)),
            ExchangeFunction::Divergence { threshold } => {
                Value::Bool(library.delta_divergence(*threshold, bar)?)
            }
        },
    };
    Ok(value)
}

/// Evaluates a condition; a numeric result is a type mismatch.
pub fn evaluate_condition(
    expr: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
) -> Result<bool, EvaluationError> {
    condition(expr, library, bar, "condition")
}

/// Evaluates a numeric expression; a boolean result is a type mismatch.
pub fn evaluate_number(
    expr: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
) -> Result<f64, EvaluationError> {
    number(expr, library, bar, "numeric expression")
}

fn condition(
    expr: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
    context: &str,
) -> Result<bool, EvaluationError> {
    match evaluate(expr, library, bar)? {
        Value::Bool(b) => Ok(b),
        Value::Number(_) => Err(mismatch(ValueType::Boolean, ValueType::Number, context)),
    }
}

fn number(
    expr: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
    context: &str,
) -> Result<f64, EvaluationError> {
    match evaluate(expr, library, bar)? {
        Value::Number(v) => Ok(v),
        Value::Bool(_) => Err(mismatch(ValueType::Number, ValueType::Boolean, context)),
    }
}

fn mismatch(expected: ValueType, found: ValueType, context: &str) -> EvaluationError {
    EvaluationError::TypeMismatch {
        expected,
        found,
        context: context.to_string(),
    }
}

fn compare(op: CompareOp, l: f64, r: f64) -> bool {
    if l.is_nan() || r.is_nan() {
        return false;
    }
    match op {
        CompareOp::Gt => l > r,
        CompareOp::Lt => l < r,
        CompareOp::Ge => l >= r,
        CompareOp::Le => l <= r,
        CompareOp::Eq => (l - r).abs() < EPSILON,
    }
}

fn arithmetic(op: ArithOp, l: f64, r: f64) -> f64 {
    match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => {
            if r == 0.0 {
                f64::NAN
            } else {
                l / r
            }
        }
    }
}

fn cross(
    direction: CrossDirection,
    left: &Expr,
    right: &Expr,
    library: &IndicatorLibrary,
    bar: usize,
) -> Result<bool, EvaluationError> {
    if bar == 0 {
        return Ok(false);
    }
    let left_curr = number(left, library, bar, "cross")?;
    let right_curr = number(right, library, bar, "cross")?;
    let left_prev = number(left, library, bar - 1, "cross")?;
    let right_prev = number(right, library, bar - 1, "cross")?;
    if [left_curr, right_curr, left_prev, right_prev]
        .iter()
        .any(|v| v.is_nan())
    {
        return Ok(false);
    }

    Ok(match direction {
        CrossDirection::Above => left_prev <= right_prev && left_curr > right_curr,
        CrossDirection::Below => left_prev >= right_prev && left_curr < right_curr,
    })
}

fn aggregate(
    function: AggregateFunction,
    expr: &Expr,
    period: usize,
    library: &IndicatorLibrary,
    bar: usize,
) -> Result<f64, EvaluationError> {
    if period == 0 {
        return Err(EvaluationError::InvalidArgument {
            function: format!("{:?}", function).to_uppercase(),
            reason: "period must be at least 1".to_string(),
        });
    }
    if bar + 1 < period {
        return Ok(f64::NAN);
    }

    let mut samples = Vec::with_capacity(period);
    for i in (bar + 1 - period)..=bar {
        samples.push(number(expr, library, i, "aggregate")?);
    }
    let valid: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return Ok(f64::NAN);
    }

    Ok(match function {
        AggregateFunction::Lowest => valid.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFunction::Highest => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFunction::Percentile => {
            let current = samples[samples.len() - 1];
            if current.is_nan() {
                return Ok(f64::NAN);
            }
            let below = valid.iter().filter(|&&v| v < current).count();
            below as f64 / valid.len() as f64 * 100.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ast::PriceField;
    use crate::domain::candle::{MarketSeries, Timeframe};
    use crate::domain::config::LibraryConfig;
    use crate::domain::indicator::tests_support::make_candles;
    use crate::domain::indicator::{Indicator, Property};
    use std::sync::Arc;

    fn library(closes: &[f64]) -> IndicatorLibrary {
        let market = MarketSeries::new("TEST", Timeframe::M1, make_candles(closes));
        IndicatorLibrary::new(Arc::new(market), LibraryConfig::default())
    }

    fn num(v: f64) -> Expr {
        Expr::number(v)
    }

    #[test]
    fn comparison_operators() {
        let lib = library(&[10.0]);
        let close = Expr::close;
        assert!(evaluate_condition(&Expr::gt(close(), num(9.0)), &lib, 0).unwrap());
        assert!(!evaluate_condition(&Expr::lt(close(), num(9.0)), &lib, 0).unwrap());
        assert!(evaluate_condition(&Expr::compare(CompareOp::Ge, close(), num(10.0)), &lib, 0).unwrap());
        assert!(evaluate_condition(&Expr::compare(CompareOp::Le, close(), num(10.0)), &lib, 0).unwrap());
    }

    #[test]
    fn equality_uses_tolerance() {
        let lib = library(&[10.0]);
        let near = Expr::compare(CompareOp::Eq, Expr::close(), num(10.0 + 5e-8));
        let far = Expr::compare(CompareOp::Eq, Expr::close(), num(10.0 + 1e-6));
        assert!(evaluate_condition(&near, &lib, 0).unwrap());
        assert!(!evaluate_condition(&far, &lib, 0).unwrap());
    }

    #[test]
    fn undefined_operand_compares_false() {
        let lib = library(&[1.0, 2.0]);
        let sma = Expr::indicator(Indicator::Sma(5));
        for op in [CompareOp::Gt, CompareOp::Lt, CompareOp::Ge, CompareOp::Le, CompareOp::Eq] {
            let expr = Expr::compare(op, sma.clone(), num(1.0));
            assert!(!evaluate_condition(&expr, &lib, 1).unwrap());
        }
    }

    #[test]
    fn cross_above_and_below() {
        let lib = library(&[1.0, 3.0, 1.0]);
        let above = Expr::cross(CrossDirection::Above, Expr::close(), num(2.0));
        let below = Expr::cross(CrossDirection::Below, Expr::close(), num(2.0));
        assert!(!evaluate_condition(&above, &lib, 0).unwrap());
        assert!(evaluate_condition(&above, &lib, 1).unwrap());
        assert!(!evaluate_condition(&below, &lib, 1).unwrap());
        assert!(evaluate_condition(&below, &lib, 2).unwrap());
    }

    #[test]
    fn cross_with_undefined_previous_is_false() {
        let lib = library(&[1.0, 2.0, 3.0, 4.0]);
        // SMA(3) first defined at bar 2, so bar 2 has no previous value
        let expr = Expr::cross(CrossDirection::Above, Expr::close(), Expr::indicator(Indicator::Sma(3)));
        assert!(!evaluate_condition(&expr, &lib, 2).unwrap());
    }

    #[test]
    fn and_short_circuits_before_right_operand() {
        let lib = library(&[1.0, 2.0, 3.0]);
        let right = Expr::gt(Expr::close(), Expr::indicator(Indicator::Sma(2)));
        let expr = Expr::and(Expr::Bool(false), right);
        assert!(!evaluate_condition(&expr, &lib, 2).unwrap());
        assert!(!lib.is_materialized(&Indicator::Sma(2)));
    }

    #[test]
    fn or_short_circuits_before_right_operand() {
        let lib = library(&[1.0, 2.0, 3.0]);
        // a numeric right operand would be a type mismatch if evaluated
        let expr = Expr::or(Expr::Bool(true), Expr::indicator(Indicator::Ema(2)));
        assert!(evaluate_condition(&expr, &lib, 2).unwrap());
        assert!(!lib.is_materialized(&Indicator::Ema(2)));
    }

    #[test]
    fn numeric_operand_in_logical_is_type_mismatch() {
        let lib = library(&[1.0, 2.0]);
        let expr = Expr::and(Expr::Bool(true), Expr::close());
        let err = evaluate_condition(&expr, &lib, 1).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::TypeMismatch {
                expected: ValueType::Boolean,
                found: ValueType::Number,
                ..
            }
        ));
    }

    #[test]
    fn boolean_in_arithmetic_is_type_mismatch() {
        let lib = library(&[1.0]);
        let expr = Expr::arith(ArithOp::Add, Expr::Bool(true), num(1.0));
        assert!(evaluate_number(&expr, &lib, 0).is_err());
        assert!(evaluate_condition(&Expr::close(), &lib, 0).is_err());
    }

    #[test]
    fn division_by_zero_is_undefined() {
        let lib = library(&[4.0]);
        let div = Expr::arith(ArithOp::Div, Expr::close(), num(0.0));
        assert!(evaluate_number(&div, &lib, 0).unwrap().is_nan());
        assert!(!evaluate_condition(&Expr::gt(div, num(0.0)), &lib, 0).unwrap());
        let half = Expr::arith(ArithOp::Div, Expr::close(), num(2.0));
        assert_eq!(evaluate_number(&half, &lib, 0).unwrap(), 2.0);
    }

    #[test]
    fn multi_output_requires_property() {
        let lib = library(&[1.0; 40]);
        let macd = Indicator::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        let err = evaluate(&Expr::indicator(macd), &lib, 39).unwrap_err();
        assert!(matches!(err, EvaluationError::MissingProperty { .. }));
        let err = evaluate(&Expr::property(macd, Property::Upper), &lib, 39).unwrap_err();
        assert!(matches!(err, EvaluationError::UnknownProperty { .. }));
        assert_eq!(
            evaluate_number(&Expr::property(macd, Property::Line), &lib, 39).unwrap(),
            0.0
        );
    }

    #[test]
    fn bbands_width_is_unnormalized() {
        let lib = library(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let bands = Indicator::Bbands {
            period: 8,
            stddev_mult_x100: 200,
        };
        let width = evaluate_number(&Expr::property(bands, Property::Width), &lib, 7).unwrap();
        assert!((width - 8.0).abs() < 1e-9);
    }

    #[test]
    fn high_of_excludes_current_bar() {
        let lib = library(&[10.0, 10.0, 10.0, 12.0, 10.0]);
        let expr = Expr::gt(Expr::close(), Expr::Range(RangeFunction::HighOf { period: 3 }));
        let results: Vec<bool> = (2..5)
            .map(|bar| evaluate_condition(&expr, &lib, bar).unwrap())
            .collect();
        assert_eq!(results, vec![false, true, false]);
    }

    #[test]
    fn lookback_reads_earlier_bar() {
        let lib = library(&[1.0, 2.0, 3.0]);
        let prev = Expr::lookback(Expr::close(), 1);
        assert_eq!(evaluate_number(&prev, &lib, 2).unwrap(), 2.0);
        assert!(evaluate_number(&prev, &lib, 0).unwrap().is_nan());

        let prev_cond = Expr::lookback(Expr::gt(Expr::close(), num(0.0)), 5);
        assert_eq!(evaluate(&prev_cond, &lib, 2).unwrap(), Value::Bool(false));
    }

    #[test]
    fn aggregates_include_current_bar() {
        let lib = library(&[5.0, 3.0, 8.0, 6.0]);
        let lowest = Expr::aggregate(AggregateFunction::Lowest, Expr::close(), 3);
        let highest = Expr::aggregate(AggregateFunction::Highest, Expr::close(), 3);
        assert!(evaluate_number(&lowest, &lib, 1).unwrap().is_nan());
        assert_eq!(evaluate_number(&lowest, &lib, 2).unwrap(), 3.0);
        assert_eq!(evaluate_number(&highest, &lib, 3).unwrap(), 8.0);
    }

    #[test]
    fn percentile_ranks_current_value() {
        let lib = library(&[1.0, 2.0, 3.0, 4.0]);
        let pct = Expr::aggregate(AggregateFunction::Percentile, Expr::close(), 4);
        // three of four samples sit below the current close
        assert_eq!(evaluate_number(&pct, &lib, 3).unwrap(), 75.0);
    }

    #[test]
    fn aggregate_over_undefined_samples() {
        let lib = library(&[1.0, 2.0, 3.0, 4.0]);
        let sma = Expr::indicator(Indicator::Sma(4));
        let lowest = Expr::aggregate(AggregateFunction::Lowest, sma.clone(), 2);
        assert!(evaluate_number(&lowest, &lib, 2).unwrap().is_nan());
        assert_eq!(evaluate_number(&lowest, &lib, 3).unwrap(), 2.5);

        let pct = Expr::aggregate(AggregateFunction::Percentile, sma, 2);
        assert_eq!(evaluate_number(&pct, &lib, 3).unwrap(), 0.0);
    }

    #[test]
    fn aggregate_zero_period_is_invalid() {
        let lib = library(&[1.0]);
        let expr = Expr::aggregate(AggregateFunction::Highest, Expr::close(), 0);
        assert!(matches!(
            evaluate_number(&expr, &lib, 0).unwrap_err(),
            EvaluationError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn not_and_between() {
        let lib = library(&[5.0]);
        let between = Expr::Between {
            expr: Box::new(Expr::price(PriceField::Close)),
            lower: Box::new(num(5.0)),
            upper: Box::new(num(6.0)),
        };
        assert!(evaluate_condition(&between, &lib, 0).unwrap());
        assert!(!evaluate_condition(&Expr::not(between), &lib, 0).unwrap());
    }

    #[test]
    fn library_errors_propagate() {
        let lib = library(&[1.0]);
        let err = evaluate(&Expr::indicator(Indicator::Sma(0)), &lib, 0).unwrap_err();
        assert!(matches!(err, EvaluationError::Library(_)));
    }
}
