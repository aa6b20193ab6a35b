mod common;

use common::*;
use proptest::prelude::*;
use signalforge::domain::ast::{
    AggregateFunction, ArithOp, CrossDirection, Expr, RangeFunction, Value,
};
use signalforge::domain::config::LibraryConfig;
use signalforge::domain::error::EvaluationError;
use signalforge::domain::eval::{evaluate, evaluate_condition, evaluate_number};
use signalforge::domain::indicator::{Indicator, ProfileSession, Property};
use signalforge::domain::library::IndicatorLibrary;
use std::sync::Arc;

fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 10.0 * (i as f64 * 0.7).sin() + (i % 5) as f64)
        .collect()
}

#[test]
fn close_above_prior_high_scenario() {
    let lib = library(&[10.0, 10.0, 10.0, 12.0, 10.0]);
    let cond = Expr::gt(Expr::close(), Expr::Range(RangeFunction::HighOf { period: 3 }));

    let results: Vec<bool> = (2..5)
        .map(|bar| evaluate_condition(&cond, &lib, bar).unwrap())
        .collect();
    // bar 2 has only two prior bars, so HIGH_OF(3) is undefined there
    assert_eq!(results, vec![false, true, false]);
}

#[test]
fn and_skips_right_operand_when_left_is_false() {
    let lib = library(&wave(30));
    let ema = Indicator::Ema(5);
    let expr = Expr::and(
        Expr::Bool(false),
        Expr::gt(Expr::indicator(ema), Expr::number(0.0)),
    );
    assert!(!evaluate_condition(&expr, &lib, 20).unwrap());
    assert!(!lib.is_materialized(&ema));

    let expr = Expr::and(
        Expr::Bool(true),
        Expr::gt(Expr::indicator(ema), Expr::number(0.0)),
    );
    assert!(evaluate_condition(&expr, &lib, 20).unwrap());
    assert!(lib.is_materialized(&ema));
}

#[test]
fn or_skips_right_operand_when_left_is_true() {
    let lib = library(&wave(30));
    let rsi = Indicator::Rsi(14);
    let expr = Expr::or(
        Expr::Bool(true),
        Expr::lt(Expr::indicator(rsi), Expr::number(30.0)),
    );
    assert!(evaluate_condition(&expr, &lib, 20).unwrap());
    assert!(!lib.is_materialized(&rsi));
}

#[test]
fn skipped_operand_is_not_type_checked() {
    let lib = library(&[1.0, 2.0]);
    let expr = Expr::and(Expr::Bool(false), Expr::number(5.0));
    assert!(!evaluate_condition(&expr, &lib, 1).unwrap());

    let expr = Expr::and(Expr::Bool(true), Expr::number(5.0));
    assert!(matches!(
        evaluate_condition(&expr, &lib, 1),
        Err(EvaluationError::TypeMismatch { .. })
    ));
}

#[test]
fn cross_is_false_at_first_bar() {
    let lib = library(&[5.0, 1.0, 9.0]);
    let up = Expr::cross(CrossDirection::Above, Expr::close(), Expr::number(3.0));
    assert!(!evaluate_condition(&up, &lib, 0).unwrap());
    assert!(!evaluate_condition(&up, &lib, 1).unwrap());
    assert!(evaluate_condition(&up, &lib, 2).unwrap());
}

#[test]
fn lookback_before_start_is_typed_undefined() {
    let lib = library(&[1.0, 2.0]);
    let prior_close = Expr::lookback(Expr::close(), 5);
    assert!(evaluate_number(&prior_close, &lib, 1).unwrap().is_nan());

    let prior_cond = Expr::lookback(Expr::gt(Expr::close(), Expr::number(0.0)), 5);
    assert_eq!(evaluate(&prior_cond, &lib, 1).unwrap(), Value::Bool(false));

    let one_back = Expr::lookback(Expr::close(), 1);
    assert_eq!(evaluate_number(&one_back, &lib, 1).unwrap(), 1.0);
}

#[test]
fn undefined_flows_through_arithmetic_and_aggregates() {
    let lib = library(&[1.0, 2.0, 3.0]);
    let sum = Expr::arith(
        ArithOp::Add,
        Expr::indicator(Indicator::Sma(10)),
        Expr::number(1.0),
    );
    assert!(evaluate_number(&sum, &lib, 2).unwrap().is_nan());

    let highest = Expr::aggregate(
        AggregateFunction::Highest,
        Expr::indicator(Indicator::Sma(10)),
        2,
    );
    assert!(evaluate_number(&highest, &lib, 2).unwrap().is_nan());

    let ratio = Expr::arith(ArithOp::Div, Expr::close(), Expr::number(0.0));
    assert!(evaluate_number(&ratio, &lib, 2).unwrap().is_nan());
}

#[test]
fn errors_are_never_swallowed() {
    let lib = library(&wave(10));
    let bare_macd = Expr::gt(
        Expr::indicator(Indicator::Macd {
            fast: 2,
            slow: 4,
            signal: 2,
        }),
        Expr::number(0.0),
    );
    assert!(matches!(
        evaluate_condition(&bare_macd, &lib, 9),
        Err(EvaluationError::MissingProperty { .. })
    ));

    let wrong_property = Expr::gt(
        Expr::property(Indicator::Sma(3), Property::Upper),
        Expr::number(0.0),
    );
    assert!(matches!(
        evaluate_condition(&wrong_property, &lib, 9),
        Err(EvaluationError::UnknownProperty { .. })
    ));

    let zero_period = Expr::gt(Expr::indicator(Indicator::Sma(0)), Expr::number(0.0));
    assert!(matches!(
        evaluate_condition(&zero_period, &lib, 9),
        Err(EvaluationError::Library(_))
    ));
}

#[test]
fn independent_bindings_are_bit_identical() {
    let candles = ranged_candles(&wave(60));
    let first = IndicatorLibrary::new(
        Arc::new(market("BTCUSDT", candles.clone())),
        LibraryConfig::default(),
    );
    let second = IndicatorLibrary::new(
        Arc::new(market("BTCUSDT", candles)),
        LibraryConfig::default(),
    );

    let indicators = [
        Indicator::Sma(5),
        Indicator::Ema(8),
        Indicator::Rsi(14),
        Indicator::Atr(14),
        Indicator::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        },
        Indicator::Bbands {
            period: 20,
            stddev_mult_x100: 200,
        },
        Indicator::Ichimoku {
            tenkan: 9,
            kijun: 26,
            senkou: 52,
        },
        Indicator::SwingHigh { strength: 2 },
        Indicator::ResistanceRay {
            lookback: 30,
            skip: 1,
        },
        Indicator::VolumeProfile {
            session: ProfileSession::Rolling(20),
            bins: 12,
        },
    ];

    for indicator in indicators {
        let a = first.series(&indicator).unwrap().columns();
        let b = second.series(&indicator).unwrap().columns();
        assert_eq!(a.len(), b.len(), "{indicator}");
        for ((name_a, xs), (name_b, ys)) in a.iter().zip(&b) {
            assert_eq!(name_a, name_b);
            let xs: Vec<u64> = xs.iter().map(|v| v.to_bits()).collect();
            let ys: Vec<u64> = ys.iter().map(|v| v.to_bits()).collect();
            assert_eq!(xs, ys, "{indicator}.{name_a}");
        }
    }
}

#[test]
fn rebinding_drops_cached_arrays() {
    let mut lib = library(&[1.0, 2.0, 3.0]);
    let sma = Indicator::Sma(2);
    assert_eq!(evaluate_number(&Expr::indicator(sma), &lib, 2).unwrap(), 2.5);
    assert!(lib.is_materialized(&sma));

    lib.bind(Arc::new(market("TEST", flat_candles(&[10.0, 20.0, 30.0]))));
    assert!(!lib.is_materialized(&sma));
    assert_eq!(evaluate_number(&Expr::indicator(sma), &lib, 2).unwrap(), 25.0);
}

proptest! {
    #[test]
    fn sma_is_undefined_during_warmup(
        closes in prop::collection::vec(1.0f64..1000.0, 1..60),
        period in 1usize..20,
    ) {
        let lib = library(&closes);
        let sma = Expr::indicator(Indicator::Sma(period));
        let above = Expr::gt(sma.clone(), Expr::number(0.0));
        let below = Expr::lt(sma.clone(), Expr::number(f64::MAX));
        for bar in 0..closes.len() {
            let value = evaluate_number(&sma, &lib, bar).unwrap();
            let warm = bar + 1 >= period;
            prop_assert_eq!(value.is_nan(), !warm);
            prop_assert_eq!(evaluate_condition(&above, &lib, bar).unwrap(), warm);
            prop_assert_eq!(evaluate_condition(&below, &lib, bar).unwrap(), warm);
        }
    }

    #[test]
    fn cross_never_fires_on_undefined_history(
        closes in prop::collection::vec(1.0f64..1000.0, 2..40),
        period in 2usize..10,
    ) {
        let lib = library(&closes);
        let cross = Expr::cross(
            CrossDirection::Above,
            Expr::close(),
            Expr::indicator(Indicator::Sma(period)),
        );
        // the previous bar's SMA is undefined until bar `period`
        for bar in 0..closes.len().min(period) {
            prop_assert!(!evaluate_condition(&cross, &lib, bar).unwrap());
        }
    }
}
