//! Calculation orchestration.
//!
//! Resolves a request's formula and input series through the ports, runs the
//! series calculator and records the outcome. Failures never escape as `Err`:
//! they end up on the record as `FAILED` with a code and message, so callers
//! can look them up later like any other result.

use crate::domain::calculator::{self, CalcOptions};
use crate::domain::error::CalcError;
use crate::domain::evaluator::Bindings;
use crate::domain::expression::Formula;
use crate::domain::interval::{Period, TimeSeries};
use crate::ports::formula_port::FormulaPort;
use crate::ports::series_port::SeriesPort;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    pub calculation_id: String,
    pub formula_id: String,
    /// Formula reference name to stored series id.
    pub input_time_series: BTreeMap<String, String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub output_time_series_id: Option<String>,
    /// Reference name whose interval count and windows drive the output.
    #[serde(default)]
    pub reference_series: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationIssue {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRecord {
    pub calculation_id: String,
    pub formula_id: String,
    pub status: CalculationStatus,
    pub accepted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_time_series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CalculationIssue>,
}

impl CalculationRecord {
    pub fn pending(request: &CalculationRequest, accepted_at: DateTime<Utc>) -> Self {
        Self {
            calculation_id: request.calculation_id.clone(),
            formula_id: request.formula_id.clone(),
            status: CalculationStatus::Pending,
            accepted_at,
            completed_at: None,
            output_time_series_id: None,
            errors: Vec::new(),
        }
    }

    pub fn complete(&mut self, output_time_series_id: String, at: DateTime<Utc>) {
        self.status = CalculationStatus::Completed;
        self.output_time_series_id = Some(output_time_series_id);
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, err: &CalcError, at: DateTime<Utc>) {
        self.status = CalculationStatus::Failed;
        self.completed_at = Some(at);
        self.errors.push(CalculationIssue {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct CalculationOutcome {
    pub record: CalculationRecord,
    pub output: Option<TimeSeries>,
}

/// The reference named by the request, else the formula's first declared input.
pub fn select_reference<'a>(
    request: &'a CalculationRequest,
    formula: &'a Formula,
) -> Result<&'a str, CalcError> {
    request
        .reference_series
        .as_deref()
        .or_else(|| formula.input_series_names.first().map(String::as_str))
        .ok_or(CalcError::MissingReference)
}

pub fn output_series_id(request: &CalculationRequest) -> String {
    request
        .output_time_series_id
        .clone()
        .unwrap_or_else(|| format!("TS-CALC-{}", request.calculation_id))
}

pub fn run_calculation(
    request: &CalculationRequest,
    formulas: &dyn FormulaPort,
    series: &dyn SeriesPort,
    options: &CalcOptions,
    cancel: Option<&AtomicBool>,
) -> CalculationOutcome {
    let mut record = CalculationRecord::pending(request, Utc::now());
    tracing::info!(
        calculation = %request.calculation_id,
        formula = %request.formula_id,
        "calculation accepted"
    );

    let result = execute(request, formulas, series, options, cancel)
        .and_then(|output| series.store_series(&output).map(|()| output));

    match result {
        Ok(output) => {
            record.complete(output.time_series_id.clone(), Utc::now());
            tracing::info!(
                calculation = %request.calculation_id,
                output = %output.time_series_id,
                intervals = output.intervals.len(),
                "calculation completed"
            );
            CalculationOutcome {
                record,
                output: Some(output),
            }
        }
        Err(e) => {
            tracing::warn!(
                calculation = %request.calculation_id,
                code = e.code(),
                error = %e,
                "calculation failed"
            );
            record.fail(&e, Utc::now());
            CalculationOutcome {
                record,
                output: None,
            }
        }
    }
}

fn execute(
    request: &CalculationRequest,
    formulas: &dyn FormulaPort,
    series: &dyn SeriesPort,
    options: &CalcOptions,
    cancel: Option<&AtomicBool>,
) -> Result<TimeSeries, CalcError> {
    let formula = formulas.fetch_formula(&request.formula_id)?;

    let mut bindings = Bindings::new();
    let mut locations: HashMap<&str, Option<String>> = HashMap::new();
    for (name, series_id) in &request.input_time_series {
        let input = series.fetch_series(series_id)?;
        input.validate()?;
        locations.insert(name.as_str(), input.market_location_id);
        bindings.insert(name.clone(), input.intervals);
    }

    let reference = select_reference(request, &formula)?;
    let intervals =
        calculator::compute_with_cancel(&formula, &bindings, reference, options, cancel)?;

    let period = request.period.clone().or_else(|| match (intervals.first(), intervals.last()) {
        (Some(first), Some(last)) => Some(Period {
            start: first.start,
            end: last.end,
        }),
        _ => None,
    });

    let calculated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(TimeSeries {
        time_series_id: output_series_id(request),
        market_location_id: locations.remove(reference).flatten(),
        measurement_type: Some(formula.output_unit.clone()),
        unit: formula.output_unit.clone(),
        resolution: formula.output_resolution.clone(),
        period,
        intervals,
        metadata: Some(serde_json::json!({
            "calculatedBy": formula.id,
            "calculationId": request.calculation_id,
            "formulaName": formula.name,
            "calculatedAt": calculated_at,
        })),
    })
}
