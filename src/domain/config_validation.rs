//! Configuration validation.
//!
//! Validates all config fields before a calculation runs and turns them into
//! typed options.

use crate::domain::calculator::CalcOptions;
use crate::domain::error::CalcError;
use crate::domain::evaluator::{DEFAULT_MAX_DEPTH, EvalOptions, FunctionPolicy};
use crate::domain::interval::{MAX_QUANTITY_DECIMALS, QUANTITY_DECIMALS};
use crate::ports::config_port::ConfigPort;
use std::ops::RangeInclusive;
use std::path::PathBuf;

const MAX_DEPTH_RANGE: RangeInclusive<i64> = 1..=1024;
const PRECISION_RANGE: RangeInclusive<i64> = 0..=MAX_QUANTITY_DECIMALS as i64;
const LOG_FORMATS: [&str; 3] = ["compact", "json", "pretty"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const SERIES_FORMATS: [&str; 2] = ["json", "csv"];

/// On-disk layout of the series directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    pub series_dir: PathBuf,
    pub formula_dir: PathBuf,
    pub series_format: SeriesFormat,
}

pub fn validate_evaluation_config(config: &dyn ConfigPort) -> Result<(), CalcError> {
    parse_policy(config)?;
    check_bounded(config, "max_depth", MAX_DEPTH_RANGE)?;
    check_bounded(config, "precision", PRECISION_RANGE)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), CalcError> {
    required_dir(config, "series_dir")?;
    required_dir(config, "formula_dir")?;
    one_of(config, "data", "series_format", &SERIES_FORMATS)?;
    Ok(())
}

pub fn validate_logging_config(config: &dyn ConfigPort) -> Result<(), CalcError> {
    one_of(config, "logging", "format", &LOG_FORMATS)?;
    one_of(config, "logging", "level", &LOG_LEVELS)?;
    Ok(())
}

/// Evaluation options from `[evaluation]`, defaults for anything unset.
pub fn build_calc_options(config: &dyn ConfigPort) -> Result<CalcOptions, CalcError> {
    validate_evaluation_config(config)?;
    let policy = parse_policy(config)?.unwrap_or_default();
    let max_depth = config.get_int("evaluation", "max_depth", DEFAULT_MAX_DEPTH as i64) as usize;
    let decimals = config.get_int("evaluation", "precision", QUANTITY_DECIMALS as i64) as usize;
    Ok(CalcOptions {
        eval: EvalOptions { policy, max_depth },
        decimals,
    })
}

pub fn data_config(config: &dyn ConfigPort) -> Result<DataConfig, CalcError> {
    validate_data_config(config)?;
    let series_format = match config.get_string("data", "series_format") {
        Some(f) if f.trim().eq_ignore_ascii_case("csv") => SeriesFormat::Csv,
        _ => SeriesFormat::Json,
    };
    Ok(DataConfig {
        series_dir: required_dir(config, "series_dir")?,
        formula_dir: required_dir(config, "formula_dir")?,
        series_format,
    })
}

fn parse_policy(config: &dyn ConfigPort) -> Result<Option<FunctionPolicy>, CalcError> {
    let Some(mode) = config.get_string("evaluation", "mode") else {
        return Ok(None);
    };
    match mode.trim().to_lowercase().as_str() {
        "strict" => Ok(Some(FunctionPolicy::Strict)),
        "lenient" => Ok(Some(FunctionPolicy::Lenient)),
        other => Err(CalcError::ConfigInvalid {
            section: "evaluation".to_string(),
            key: "mode".to_string(),
            reason: format!("expected strict or lenient, got '{other}'"),
        }),
    }
}

/// Checked on the raw text; `get_int` falls back silently on garbage.
fn check_bounded(
    config: &dyn ConfigPort,
    key: &str,
    range: RangeInclusive<i64>,
) -> Result<(), CalcError> {
    let Some(raw) = config.get_string("evaluation", key) else {
        return Ok(());
    };
    let invalid = || CalcError::ConfigInvalid {
        section: "evaluation".to_string(),
        key: key.to_string(),
        reason: format!(
            "{key} must be an integer between {} and {}",
            range.start(),
            range.end()
        ),
    };
    let value: i64 = raw.trim().parse().map_err(|_| invalid())?;
    if !range.contains(&value) {
        return Err(invalid());
    }
    Ok(())
}

fn required_dir(config: &dyn ConfigPort, key: &str) -> Result<PathBuf, CalcError> {
    match config.get_string("data", key) {
        Some(s) if !s.trim().is_empty() => Ok(PathBuf::from(s.trim())),
        _ => Err(CalcError::ConfigMissing {
            section: "data".to_string(),
            key: key.to_string(),
        }),
    }
}

fn one_of(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), CalcError> {
    match config.get_string(section, key) {
        None => Ok(()),
        Some(v) if allowed.contains(&v.trim().to_lowercase().as_str()) => Ok(()),
        Some(v) => Err(CalcError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{}' is not one of {}", v.trim(), allowed.join(", ")),
        }),
    }
}
