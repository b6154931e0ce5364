//! JSON file store.
//!
//! Formulas and series live in two directories as `<id>.json`. Formula files
//! hold the submission document shape and are validated again on every read.

use crate::adapters::document_path;
use crate::domain::error::CalcError;
use crate::domain::evaluator::EvalOptions;
use crate::domain::expression::Formula;
use crate::domain::formula_builder::{FormulaDocument, build_formula};
use crate::domain::interval::TimeSeries;
use crate::ports::formula_port::FormulaPort;
use crate::ports::series_port::SeriesPort;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct JsonStoreAdapter {
    series_dir: PathBuf,
    formula_dir: PathBuf,
    options: EvalOptions,
}

impl JsonStoreAdapter {
    pub fn new(series_dir: PathBuf, formula_dir: PathBuf, options: EvalOptions) -> Self {
        Self {
            series_dir,
            formula_dir,
            options,
        }
    }

    fn json_path(dir: &Path, id: &str) -> Result<PathBuf, CalcError> {
        document_path(dir, id, "json")
    }
}

/// `Ok(None)` when the file does not exist.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CalcError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CalcError::Storage {
                reason: format!("failed to read {}: {}", path.display(), e),
            });
        }
    };
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_document<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), CalcError> {
    fs::create_dir_all(dir).map_err(|e| CalcError::Storage {
        reason: format!("failed to create directory {}: {}", dir.display(), e),
    })?;
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| CalcError::Storage {
        reason: format!("failed to write {}: {}", path.display(), e),
    })
}

impl FormulaPort for JsonStoreAdapter {
    fn fetch_formula(&self, formula_id: &str) -> Result<Formula, CalcError> {
        let path = Self::json_path(&self.formula_dir, formula_id)?;
        let doc: FormulaDocument =
            read_document(&path)?.ok_or_else(|| CalcError::FormulaNotFound {
                id: formula_id.to_string(),
            })?;
        if doc.formula_id != formula_id {
            return Err(CalcError::InvalidFormula {
                reason: format!(
                    "{} declares formulaId '{}'",
                    path.display(),
                    doc.formula_id
                ),
            });
        }
        build_formula(&doc, &self.options)
    }

    fn store_formula(&self, formula: &Formula) -> Result<(), CalcError> {
        let path = Self::json_path(&self.formula_dir, &formula.id)?;
        write_document(&self.formula_dir, &path, &FormulaDocument::from(formula))?;
        tracing::debug!(formula = %formula.id, path = %path.display(), "stored formula");
        Ok(())
    }

    fn list_formulas(&self) -> Result<Vec<String>, CalcError> {
        let entries = match fs::read_dir(&self.formula_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CalcError::Storage {
                    reason: format!(
                        "failed to read directory {}: {}",
                        self.formula_dir.display(),
                        e
                    ),
                });
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CalcError::Storage {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(id) = name_str.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }
}

impl SeriesPort for JsonStoreAdapter {
    fn fetch_series(&self, series_id: &str) -> Result<TimeSeries, CalcError> {
        let path = Self::json_path(&self.series_dir, series_id)?;
        let series: TimeSeries =
            read_document(&path)?.ok_or_else(|| CalcError::SeriesNotFound {
                id: series_id.to_string(),
            })?;
        if series.time_series_id != series_id {
            return Err(CalcError::InvalidSeries {
                series: series_id.to_string(),
                reason: format!("file declares timeSeriesId '{}'", series.time_series_id),
            });
        }
        tracing::debug!(series = series_id, intervals = series.intervals.len(), "read series");
        Ok(series)
    }

    fn store_series(&self, series: &TimeSeries) -> Result<(), CalcError> {
        let path = Self::json_path(&self.series_dir, &series.time_series_id)?;
        write_document(&self.series_dir, &path, series)?;
        tracing::debug!(series = %series.time_series_id, path = %path.display(), "stored series");
        Ok(())
    }
}
