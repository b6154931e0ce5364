//! Series calculator.
//!
//! Drives the evaluator over every interval of the reference series and
//! assembles the output intervals. The reference series is always named
//! explicitly; its interval count and time windows carry over to the output.

use crate::domain::error::CalcError;
use crate::domain::evaluator::{self, Bindings, EvalOptions, FunctionPolicy};
use crate::domain::expression::Formula;
use crate::domain::interval::{Interval, QUANTITY_DECIMALS, Quality, Quantity};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalcOptions {
    pub eval: EvalOptions,
    /// Fractional digits of output quantities.
    pub decimals: usize,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            eval: EvalOptions::default(),
            decimals: QUANTITY_DECIMALS,
        }
    }
}

pub fn compute(
    formula: &Formula,
    bindings: &Bindings,
    reference: &str,
    options: &CalcOptions,
) -> Result<Vec<Interval>, CalcError> {
    compute_with_cancel(formula, bindings, reference, options, None)
}

/// Same as [`compute`], checking `cancel` once before each interval.
pub fn compute_with_cancel(
    formula: &Formula,
    bindings: &Bindings,
    reference: &str,
    options: &CalcOptions,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<Interval>, CalcError> {
    let reference_series = bindings
        .get(reference)
        .ok_or_else(|| CalcError::UnboundReference {
            name: reference.to_string(),
        })?;
    let count = reference_series.len();

    check_alignment(formula, bindings, reference, count)?;
    check_functions(formula, &options.eval)?;

    let mut output = Vec::with_capacity(count);
    for (i, source) in reference_series.iter().enumerate() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(CalcError::Cancelled { position: i + 1 });
        }

        let value = evaluator::evaluate(&formula.expression, bindings, i, &options.eval)?;
        if !value.is_finite() {
            return Err(CalcError::InvalidQuantity {
                value: value.to_string(),
            });
        }

        output.push(Interval {
            position: (i + 1) as u32,
            start: source.start,
            end: source.end,
            quantity: Quantity::rounded(value, options.decimals),
            quality: Quality::Validated,
        });
    }

    tracing::debug!(
        formula = %formula.id,
        reference,
        intervals = output.len(),
        "formula computed"
    );
    Ok(output)
}

/// Every series the expression reads must be bound and at least as long as
/// the reference series.
pub fn check_alignment(
    formula: &Formula,
    bindings: &Bindings,
    reference: &str,
    count: usize,
) -> Result<(), CalcError> {
    for name in formula.expression.referenced_series() {
        let series = bindings
            .get(&name)
            .ok_or_else(|| CalcError::UnboundReference { name: name.clone() })?;
        if series.len() < count {
            return Err(CalcError::MisalignedSeries {
                name,
                len: series.len(),
                reference: reference.to_string(),
                expected: count,
            });
        }
    }
    Ok(())
}

fn check_functions(formula: &Formula, options: &EvalOptions) -> Result<(), CalcError> {
    for name in formula.expression.unknown_functions() {
        match options.policy {
            FunctionPolicy::Strict => {
                return Err(CalcError::UnsupportedFunction {
                    name,
                    path: formula.id.clone(),
                });
            }
            FunctionPolicy::Lenient => {
                tracing::warn!(
                    formula = %formula.id,
                    function = %name,
                    "unrecognised function evaluates to 0"
                );
            }
        }
    }
    Ok(())
}
