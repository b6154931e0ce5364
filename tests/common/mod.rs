#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use mabis_calc::domain::error::CalcError;
pub use mabis_calc::domain::expression::{Comparator, Expression, Formula, FormulaFunction, Parameter};
pub use mabis_calc::domain::interval::{Interval, Quality, Quantity, TimeSeries};
use mabis_calc::ports::formula_port::FormulaPort;
use mabis_calc::ports::series_port::SeriesPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockFormulaPort {
    pub formulas: RefCell<HashMap<String, Formula>>,
}

impl MockFormulaPort {
    pub fn new() -> Self {
        Self {
            formulas: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_formula(self, formula: Formula) -> Self {
        self.formulas
            .borrow_mut()
            .insert(formula.id.clone(), formula);
        self
    }
}

impl FormulaPort for MockFormulaPort {
    fn fetch_formula(&self, formula_id: &str) -> Result<Formula, CalcError> {
        self.formulas
            .borrow()
            .get(formula_id)
            .cloned()
            .ok_or_else(|| CalcError::FormulaNotFound {
                id: formula_id.to_string(),
            })
    }

    fn store_formula(&self, formula: &Formula) -> Result<(), CalcError> {
        self.formulas
            .borrow_mut()
            .insert(formula.id.clone(), formula.clone());
        Ok(())
    }

    fn list_formulas(&self) -> Result<Vec<String>, CalcError> {
        let mut ids: Vec<String> = self.formulas.borrow().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

pub struct MockSeriesPort {
    pub series: RefCell<HashMap<String, TimeSeries>>,
    pub errors: HashMap<String, String>,
}

impl MockSeriesPort {
    pub fn new() -> Self {
        Self {
            series: RefCell::new(HashMap::new()),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(self, series: TimeSeries) -> Self {
        self.series
            .borrow_mut()
            .insert(series.time_series_id.clone(), series);
        self
    }

    pub fn with_error(mut self, series_id: &str, reason: &str) -> Self {
        self.errors.insert(series_id.to_string(), reason.to_string());
        self
    }

    pub fn stored(&self, series_id: &str) -> Option<TimeSeries> {
        self.series.borrow().get(series_id).cloned()
    }
}

impl SeriesPort for MockSeriesPort {
    fn fetch_series(&self, series_id: &str) -> Result<TimeSeries, CalcError> {
        if let Some(reason) = self.errors.get(series_id) {
            return Err(CalcError::Storage {
                reason: reason.clone(),
            });
        }
        self.series
            .borrow()
            .get(series_id)
            .cloned()
            .ok_or_else(|| CalcError::SeriesNotFound {
                id: series_id.to_string(),
            })
    }

    fn store_series(&self, series: &TimeSeries) -> Result<(), CalcError> {
        self.series
            .borrow_mut()
            .insert(series.time_series_id.clone(), series.clone());
        Ok(())
    }
}

pub fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

pub fn quarter_hours(values: &[f64]) -> Vec<Interval> {
    let base = day_start();
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

pub fn make_series(id: &str, values: &[f64]) -> TimeSeries {
    TimeSeries {
        time_series_id: id.to_string(),
        market_location_id: Some(format!("MALO-{id}")),
        measurement_type: Some("CONSUMPTION".to_string()),
        unit: "KWH".to_string(),
        resolution: "PT15M".to_string(),
        period: None,
        intervals: quarter_hours(values),
        metadata: None,
    }
}

/// 96 quarter-hours of a sinusoidal day profile between 10 and 30.
pub fn day_profile() -> Vec<f64> {
    (0..96)
        .map(|i| 20.0 + 10.0 * ((i as f64) * std::f64::consts::PI / 48.0).sin())
        .collect()
}

pub fn make_formula(id: &str, expression: Expression, inputs: &[&str]) -> Formula {
    Formula {
        id: id.to_string(),
        name: format!("{id} test formula"),
        description: None,
        expression,
        input_series_names: inputs.iter().map(|s| s.to_string()).collect(),
        output_unit: "KWH".to_string(),
        output_resolution: "PT15M".to_string(),
        category: None,
        version: None,
    }
}

pub fn quantities(intervals: &[Interval]) -> Vec<String> {
    intervals.iter().map(|i| i.quantity.to_string()).collect()
}
