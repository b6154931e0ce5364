//! Formula evaluation engine.
//!
//! Evaluates an expression tree at one interval index against the bound
//! input series.
//!
//! # Evaluation Semantics
//!
//! - Series references resolve to `quantity * scaling_factor` at the index
//! - `Wenn_Dann`: compares parameters 1 and 3 with the operator in parameter 2,
//!   then evaluates only the selected branch
//! - `Grp_Sum`, `Quer_Max`, `Quer_Min`: an empty parameter list yields 0
//! - Unknown functions and comparators yield 0 / the else-branch in lenient
//!   mode and fail in strict mode
//! - `==` is deliberately not exact float equality: operands within an
//!   absolute 1e-9 of each other compare equal, so `0.1 + 0.2 == 0.3` holds

use crate::domain::error::CalcError;
use crate::domain::expression::{Comparator, Expression, FormulaFunction, Parameter};
use crate::domain::interval::Interval;
use std::collections::HashMap;

const EPSILON: f64 = 1e-9;

/// Reference name to the interval array bound to it for one calculation.
pub type Bindings = HashMap<String, Vec<Interval>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionPolicy {
    Strict,
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    pub policy: FunctionPolicy,
    pub max_depth: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 64;

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            policy: FunctionPolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

pub fn evaluate(
    expr: &Expression,
    bindings: &Bindings,
    index: usize,
    options: &EvalOptions,
) -> Result<f64, CalcError> {
    eval_node(expr, bindings, index, options, 1)
}

/// Resolve a single parameter to a number. Operator tokens resolve to 0.
pub fn resolve(
    param: &Parameter,
    bindings: &Bindings,
    index: usize,
    options: &EvalOptions,
) -> Result<f64, CalcError> {
    resolve_at(param, bindings, index, options, 1)
}

fn eval_node(
    expr: &Expression,
    bindings: &Bindings,
    index: usize,
    options: &EvalOptions,
    depth: usize,
) -> Result<f64, CalcError> {
    if depth > options.max_depth {
        return Err(CalcError::DepthExceeded {
            max_depth: options.max_depth,
        });
    }

    let params = &expr.parameters;
    let value = |i: usize| resolve_at(&params[i], bindings, index, options, depth);

    match &expr.function {
        FormulaFunction::WennDann => {
            require(expr, 5)?;
            let symbol = match &params[1] {
                Parameter::OperatorToken(symbol) => symbol,
                other => {
                    return Err(CalcError::ParameterType {
                        function: expr.function.name().to_string(),
                        path: "evaluation".into(),
                        index: 1,
                        expected: "an operator token".into(),
                        found: other.kind().into(),
                    });
                }
            };
            let left = value(0)?;
            let right = value(2)?;
            let holds = match Comparator::from_symbol(symbol) {
                Some(cmp) => compare(cmp, left, right),
                None => match options.policy {
                    FunctionPolicy::Strict => {
                        return Err(CalcError::UnknownComparator {
                            symbol: symbol.clone(),
                            path: "evaluation".into(),
                        });
                    }
                    FunctionPolicy::Lenient => false,
                },
            };
            if holds { value(3) } else { value(4) }
        }
        FormulaFunction::GrpSum => {
            let mut total = 0.0;
            for param in params {
                total += resolve_at(param, bindings, index, options, depth)?;
            }
            Ok(total)
        }
        FormulaFunction::AnteilGroesserAls => {
            require(expr, 2)?;
            let v = value(0)?;
            let threshold = value(1)?;
            Ok(if v > threshold { v } else { 0.0 })
        }
        FormulaFunction::AnteilKleinerAls => {
            require(expr, 2)?;
            let v = value(0)?;
            let threshold = value(1)?;
            Ok(if v < threshold { v } else { 0.0 })
        }
        FormulaFunction::QuerMax => fold_values(expr, bindings, index, options, depth, f64::max),
        FormulaFunction::QuerMin => fold_values(expr, bindings, index, options, depth, f64::min),
        FormulaFunction::Round => {
            require(expr, 2)?;
            let v = value(0)?;
            let digits = value(1)?.round().clamp(-15.0, 15.0) as i32;
            let factor = 10f64.powi(digits);
            Ok((v * factor).round() / factor)
        }
        FormulaFunction::IMax => whole_series(expr, bindings, f64::max),
        FormulaFunction::IMin => whole_series(expr, bindings, f64::min),
        FormulaFunction::Unknown(name) => match options.policy {
            FunctionPolicy::Strict => Err(CalcError::UnsupportedFunction {
                name: name.clone(),
                path: "evaluation".into(),
            }),
            FunctionPolicy::Lenient => {
                tracing::trace!(function = %name, index, "unknown function evaluates to 0");
                Ok(0.0)
            }
        },
    }
}

fn resolve_at(
    param: &Parameter,
    bindings: &Bindings,
    index: usize,
    options: &EvalOptions,
    depth: usize,
) -> Result<f64, CalcError> {
    match param {
        Parameter::Constant(v) => Ok(*v),
        Parameter::SeriesRef {
            name,
            scaling_factor,
        } => {
            let series = lookup(bindings, name)?;
            let interval = series.get(index).ok_or_else(|| CalcError::IndexOutOfRange {
                name: name.clone(),
                index,
                len: series.len(),
            })?;
            Ok(interval.value() * scaling_factor)
        }
        Parameter::Expression(inner) => eval_node(inner, bindings, index, options, depth + 1),
        Parameter::OperatorToken(_) => Ok(0.0),
    }
}

fn lookup<'a>(bindings: &'a Bindings, name: &str) -> Result<&'a [Interval], CalcError> {
    bindings
        .get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| CalcError::UnboundReference {
            name: name.to_string(),
        })
}

fn require(expr: &Expression, count: usize) -> Result<(), CalcError> {
    if expr.parameters.len() != count {
        return Err(CalcError::Arity {
            function: expr.function.name().to_string(),
            path: "evaluation".into(),
            expected: count.to_string(),
            found: expr.parameters.len(),
        });
    }
    Ok(())
}

fn compare(cmp: Comparator, left: f64, right: f64) -> bool {
    match cmp {
        Comparator::Greater => left > right,
        Comparator::Less => left < right,
        Comparator::GreaterOrEqual => left >= right,
        Comparator::LessOrEqual => left <= right,
        Comparator::Equal => (left - right).abs() < EPSILON,
    }
}

fn fold_values(
    expr: &Expression,
    bindings: &Bindings,
    index: usize,
    options: &EvalOptions,
    depth: usize,
    pick: fn(f64, f64) -> f64,
) -> Result<f64, CalcError> {
    let mut acc: Option<f64> = None;
    for param in &expr.parameters {
        let v = resolve_at(param, bindings, index, options, depth)?;
        acc = Some(acc.map_or(v, |a| pick(a, v)));
    }
    Ok(acc.unwrap_or(0.0))
}

fn whole_series(
    expr: &Expression,
    bindings: &Bindings,
    pick: fn(f64, f64) -> f64,
) -> Result<f64, CalcError> {
    require(expr, 1)?;
    match &expr.parameters[0] {
        Parameter::SeriesRef {
            name,
            scaling_factor,
        } => {
            let series = lookup(bindings, name)?;
            Ok(series
                .iter()
                .map(|i| i.value() * scaling_factor)
                .reduce(pick)
                .unwrap_or(0.0))
        }
        other => Err(CalcError::ParameterType {
            function: expr.function.name().to_string(),
            path: "evaluation".into(),
            index: 0,
            expected: "a series reference".into(),
            found: other.kind().into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interval::{Quality, Quantity};
    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<Interval> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Interval {
                position: i as u32 + 1,
                start: base + TimeDelta::minutes(15 * i as i64),
                end: base + TimeDelta::minutes(15 * (i as i64 + 1)),
                quantity: Quantity::new(*v),
                quality: Quality::Validated,
            })
            .collect()
    }

    fn bind(entries: &[(&str, &[f64])]) -> Bindings {
        entries
            .iter()
            .map(|(name, values)| (name.to_string(), series(values)))
            .collect()
    }

    fn eval(expr: &Expression, bindings: &Bindings, index: usize) -> f64 {
        evaluate(expr, bindings, index, &EvalOptions::default()).unwrap()
    }

    fn strict() -> EvalOptions {
        EvalOptions {
            policy: FunctionPolicy::Strict,
            ..EvalOptions::default()
        }
    }

    #[test]
    fn series_ref_applies_scaling_factor() {
        let bindings = bind(&[("a", &[10.0])]);
        let v = resolve(
            &Parameter::scaled("a", -1.0),
            &bindings,
            0,
            &EvalOptions::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(v, -10.0);
    }

    #[test]
    fn constant_resolves_to_itself() {
        let v = resolve(
            &Parameter::Constant(2.5),
            &Bindings::new(),
            7,
            &EvalOptions::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(v, 2.5);
    }

    #[test]
    fn operator_token_resolves_to_zero() {
        let v = resolve(
            &Parameter::OperatorToken(">".into()),
            &Bindings::new(),
            0,
            &EvalOptions::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(v, 0.0);
    }

    #[test]
    fn grp_sum_with_negative_scaling() {
        let bindings = bind(&[("a", &[1.0, 2.0, 3.0]), ("b", &[10.0, 20.0, 30.0])]);
        let expr = Expression::new(
            FormulaFunction::GrpSum,
            vec![Parameter::series("a"), Parameter::scaled("b", -1.0)],
        );
        let out: Vec<f64> = (0..3).map(|i| eval(&expr, &bindings, i)).collect();
        assert_eq!(out, vec![-9.0, -18.0, -27.0]);
    }

    #[test]
    fn wenn_dann_selects_branch() {
        let bindings = bind(&[("a", &[5.0, 5.0]), ("b", &[3.0, 7.0])]);
        let expr = Expression::new(
            FormulaFunction::WennDann,
            vec![
                Parameter::series("a"),
                Parameter::operator(Comparator::Greater),
                Parameter::series("b"),
                Parameter::series("a"),
                Parameter::Constant(0.0),
            ],
        );
        assert_abs_diff_eq!(eval(&expr, &bindings, 0), 5.0);
        assert_abs_diff_eq!(eval(&expr, &bindings, 1), 0.0);
    }

    #[test]
    fn wenn_dann_all_comparators() {
        let cases = [
            (">", 1.0, 1.0, false),
            ("<", 1.0, 2.0, true),
            (">=", 1.0, 1.0, true),
            ("<=", 2.0, 1.0, false),
            ("==", 0.1 + 0.2, 0.3, true),
        ];
        for (symbol, left, right, expected) in cases {
            let expr = Expression::new(
                FormulaFunction::WennDann,
                vec![
                    Parameter::Constant(left),
                    Parameter::OperatorToken(symbol.into()),
                    Parameter::Constant(right),
                    Parameter::Constant(1.0),
                    Parameter::Constant(-1.0),
                ],
            );
            let want = if expected { 1.0 } else { -1.0 };
            assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), want);
        }
    }

    #[test]
    fn equality_tolerance_is_absolute_and_tight() {
        let eq = |left: f64, right: f64| {
            let expr = Expression::new(
                FormulaFunction::WennDann,
                vec![
                    Parameter::Constant(left),
                    Parameter::operator(Comparator::Equal),
                    Parameter::Constant(right),
                    Parameter::Constant(1.0),
                    Parameter::Constant(0.0),
                ],
            );
            eval(&expr, &Bindings::new(), 0)
        };
        assert_abs_diff_eq!(eq(100.0, 100.0 + 5e-10), 1.0);
        assert_abs_diff_eq!(eq(100.0, 100.0 + 1e-6), 0.0);
        assert_abs_diff_eq!(eq(0.001, 0.002), 0.0);
    }

    #[test]
    fn unknown_comparator_lenient_takes_else_strict_fails() {
        let expr = Expression::new(
            FormulaFunction::WennDann,
            vec![
                Parameter::Constant(5.0),
                Parameter::OperatorToken("!=".into()),
                Parameter::Constant(3.0),
                Parameter::Constant(1.0),
                Parameter::Constant(2.0),
            ],
        );
        assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), 2.0);
        let err = evaluate(&expr, &Bindings::new(), 0, &strict()).unwrap_err();
        assert!(matches!(err, CalcError::UnknownComparator { .. }));
    }

    #[test]
    fn wenn_dann_requires_operator_token() {
        let expr = Expression::new(
            FormulaFunction::WennDann,
            vec![
                Parameter::Constant(5.0),
                Parameter::Constant(1.0),
                Parameter::Constant(3.0),
                Parameter::Constant(1.0),
                Parameter::Constant(2.0),
            ],
        );
        let err = evaluate(&expr, &Bindings::new(), 0, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err, CalcError::ParameterType { index: 1, .. }));
    }

    #[test]
    fn share_above_and_below_threshold() {
        let bindings = bind(&[("a", &[40.0, 60.0])]);
        let above = Expression::new(
            FormulaFunction::AnteilGroesserAls,
            vec![Parameter::series("a"), Parameter::Constant(50.0)],
        );
        let below = Expression::new(
            FormulaFunction::AnteilKleinerAls,
            vec![Parameter::series("a"), Parameter::Constant(50.0)],
        );
        assert_abs_diff_eq!(eval(&above, &bindings, 0), 0.0);
        assert_abs_diff_eq!(eval(&above, &bindings, 1), 60.0);
        assert_abs_diff_eq!(eval(&below, &bindings, 0), 40.0);
        assert_abs_diff_eq!(eval(&below, &bindings, 1), 0.0);
    }

    #[test]
    fn nested_quer_max_evaluates_both_branches() {
        let bindings = bind(&[("ts1", &[40.0, 80.0, 70.0]), ("ts2", &[150.0, 250.0, 30.0])]);
        let expr = Expression::new(
            FormulaFunction::QuerMax,
            vec![
                Parameter::nested(Expression::new(
                    FormulaFunction::AnteilGroesserAls,
                    vec![Parameter::series("ts1"), Parameter::Constant(50.0)],
                )),
                Parameter::nested(Expression::new(
                    FormulaFunction::AnteilKleinerAls,
                    vec![Parameter::series("ts2"), Parameter::Constant(200.0)],
                )),
            ],
        );
        // index 0: max(0, 150); index 1: max(80, 0); index 2: max(70, 30)
        assert_abs_diff_eq!(eval(&expr, &bindings, 0), 150.0);
        assert_abs_diff_eq!(eval(&expr, &bindings, 1), 80.0);
        assert_abs_diff_eq!(eval(&expr, &bindings, 2), 70.0);
    }

    #[test]
    fn quer_min_and_empty_lists() {
        let expr = Expression::new(
            FormulaFunction::QuerMin,
            vec![
                Parameter::Constant(3.0),
                Parameter::Constant(-2.0),
                Parameter::Constant(7.0),
            ],
        );
        assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), -2.0);

        for function in [
            FormulaFunction::QuerMax,
            FormulaFunction::QuerMin,
            FormulaFunction::GrpSum,
        ] {
            let empty = Expression::new(function, vec![]);
            assert_abs_diff_eq!(eval(&empty, &Bindings::new(), 0), 0.0);
        }
    }

    #[test]
    fn round_to_digits() {
        let expr = Expression::new(
            FormulaFunction::Round,
            vec![Parameter::Constant(12.3456), Parameter::Constant(2.0)],
        );
        assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), 12.35, epsilon = 1e-12);
    }

    #[test]
    fn imax_and_imin_scan_whole_series() {
        let bindings = bind(&[("a", &[3.0, 9.0, -4.0])]);
        let imax = Expression::new(FormulaFunction::IMax, vec![Parameter::series("a")]);
        let imin = Expression::new(FormulaFunction::IMin, vec![Parameter::scaled("a", 2.0)]);
        for i in 0..3 {
            assert_abs_diff_eq!(eval(&imax, &bindings, i), 9.0);
            assert_abs_diff_eq!(eval(&imin, &bindings, i), -8.0);
        }
    }

    #[test]
    fn unknown_function_lenient_is_zero_strict_fails() {
        let expr = Expression::new(
            FormulaFunction::Unknown("Conv_RKMG".into()),
            vec![Parameter::Constant(5.0)],
        );
        assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), 0.0);
        let err = evaluate(&expr, &Bindings::new(), 0, &strict()).unwrap_err();
        assert!(matches!(err, CalcError::UnsupportedFunction { ref name, .. } if name == "Conv_RKMG"));
    }

    #[test]
    fn unbound_reference_fails() {
        let expr = Expression::new(FormulaFunction::GrpSum, vec![Parameter::series("missing")]);
        let err = evaluate(&expr, &Bindings::new(), 0, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err, CalcError::UnboundReference { ref name } if name == "missing"));
    }

    #[test]
    fn index_past_series_end_fails() {
        let bindings = bind(&[("a", &[1.0, 2.0])]);
        let expr = Expression::new(FormulaFunction::GrpSum, vec![Parameter::series("a")]);
        let err = evaluate(&expr, &bindings, 2, &EvalOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CalcError::IndexOutOfRange { index: 2, len: 2, .. }
        ));
    }

    #[test]
    fn fixed_arity_checked_at_evaluation() {
        let expr = Expression::new(
            FormulaFunction::AnteilGroesserAls,
            vec![Parameter::Constant(1.0)],
        );
        let err = evaluate(&expr, &Bindings::new(), 0, &EvalOptions::default()).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn depth_ceiling_fails_fast() {
        let mut expr = Expression::new(FormulaFunction::GrpSum, vec![Parameter::Constant(1.0)]);
        for _ in 0..10 {
            expr = Expression::new(FormulaFunction::GrpSum, vec![Parameter::nested(expr)]);
        }
        let shallow = EvalOptions {
            max_depth: 5,
            ..EvalOptions::default()
        };
        let err = evaluate(&expr, &Bindings::new(), 0, &shallow).unwrap_err();
        assert!(matches!(err, CalcError::DepthExceeded { max_depth: 5 }));
        assert_abs_diff_eq!(eval(&expr, &Bindings::new(), 0), 1.0);
    }
}
