//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, write_intervals_to_file};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_store_adapter::JsonStoreAdapter;
use crate::domain::calculation::{CalculationRequest, CalculationStatus, run_calculation};
use crate::domain::calculator::CalcOptions;
use crate::domain::config_validation::{
    SeriesFormat, build_calc_options, data_config, validate_logging_config,
};
use crate::domain::error::CalcError;
use crate::domain::evaluator::FunctionPolicy;
use crate::domain::expression_parser;
use crate::domain::formula_builder::{
    ExpressionDocument, FormulaDocument, FormulaSubmission, SubmissionReport, submit,
    validate_expression,
};
use crate::domain::interval::TimeSeries;
use crate::logging::{self, LogFormat, LogSettings};
use crate::ports::config_port::ConfigPort;
use crate::ports::formula_port::FormulaPort;

#[derive(Parser, Debug)]
#[command(
    name = "mabis-calc",
    about = "Formula calculation over metering interval series"
)]
pub struct Cli {
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a formula document or submission batch
    Validate {
        #[arg(short, long)]
        formula: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
    },
    /// Validate a submission batch and store the accepted formulas
    Submit {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        formula: PathBuf,
    },
    /// Parse a formula in text notation and print its JSON tree
    Parse {
        #[arg(short, long)]
        expr: String,
        /// Declared input names; references outside this list are rejected
        #[arg(long, value_delimiter = ',')]
        inputs: Vec<String>,
        #[arg(long)]
        strict: bool,
    },
    /// Run a calculation request against the configured store
    Calculate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        request: PathBuf,
        /// Also write the output series here (.csv or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the formulas in the configured store
    ListFormulas {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Command {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Command::Validate { config, .. } => config.as_deref(),
            Command::Submit { config, .. }
            | Command::Calculate { config, .. }
            | Command::ListFormulas { config } => Some(config.as_path()),
            Command::Parse { .. } => None,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let settings = log_settings(&cli);
    if let Err(e) = logging::init(&settings) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let result = match cli.command {
        Command::Validate {
            formula,
            config,
            strict,
        } => run_validate(&formula, config.as_deref(), strict),
        Command::Submit { config, formula } => run_submit(&config, &formula),
        Command::Parse {
            expr,
            inputs,
            strict,
        } => run_parse(&expr, &inputs, strict),
        Command::Calculate {
            config,
            request,
            output,
        } => run_calculate(&config, &request, output.as_deref()),
        Command::ListFormulas { config } => run_list_formulas(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// `[logging]` from the command's config file, overridden by flags.
pub fn log_settings(cli: &Cli) -> LogSettings {
    let mut settings = LogSettings::default();
    if let Some(config) = cli
        .command
        .config_path()
        .and_then(|p| FileConfigAdapter::from_file(p).ok())
    {
        if let Some(level) = config.get_string("logging", "level") {
            settings.level = level.trim().to_lowercase();
        }
        if let Some(format) = config
            .get_string("logging", "format")
            .and_then(|f| f.parse().ok())
        {
            settings.format = format;
        }
    }
    if let Some(format) = cli.log_format {
        settings.format = format;
    }
    settings.level = logging::level_for_verbosity(&settings.level, cli.verbose);
    settings
}

pub fn load_options(config_path: Option<&Path>, strict: bool) -> Result<CalcOptions, CalcError> {
    let mut options = match config_path {
        Some(path) => build_calc_options(&FileConfigAdapter::from_file(path)?)?,
        None => CalcOptions::default(),
    };
    if strict {
        options.eval.policy = FunctionPolicy::Strict;
    }
    Ok(options)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CalcError> {
    let content = fs::read_to_string(path).map_err(|e| CalcError::Storage {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CalcError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A file holding either a single formula document or a `{messageId,
/// formulas}` batch.
pub fn read_submission(path: &Path) -> Result<FormulaSubmission, CalcError> {
    let value: serde_json::Value = read_json(path)?;
    if value.get("formulas").is_some() {
        Ok(serde_json::from_value(value)?)
    } else {
        let doc: FormulaDocument = serde_json::from_value(value)?;
        Ok(FormulaSubmission {
            message_id: None,
            formulas: vec![doc],
        })
    }
}

fn report_exit_code(report: &SubmissionReport) -> ExitCode {
    if report.status == "ACCEPTED" {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn run_validate(
    formula_path: &Path,
    config_path: Option<&Path>,
    strict: bool,
) -> Result<ExitCode, CalcError> {
    let options = load_options(config_path, strict)?;
    let submission = read_submission(formula_path)?;
    eprintln!(
        "Validating {} formula(s) from {}",
        submission.formulas.len(),
        formula_path.display()
    );

    let (_, report) = submit(&submission, &options.eval);
    print_json(&report)?;
    Ok(report_exit_code(&report))
}

fn run_submit(config_path: &Path, formula_path: &Path) -> Result<ExitCode, CalcError> {
    let config = FileConfigAdapter::from_file(config_path)?;
    let options = build_calc_options(&config)?;
    let data = data_config(&config)?;
    let store = JsonStoreAdapter::new(data.series_dir, data.formula_dir, options.eval);

    let submission = read_submission(formula_path)?;
    let (accepted, report) = submit(&submission, &options.eval);
    for formula in &accepted {
        store.store_formula(formula)?;
    }
    tracing::info!(
        accepted = accepted.len(),
        submitted = submission.formulas.len(),
        status = %report.status,
        "formula submission processed"
    );

    print_json(&report)?;
    Ok(report_exit_code(&report))
}

fn run_parse(text: &str, inputs: &[String], strict: bool) -> Result<ExitCode, CalcError> {
    let options = load_options(None, strict)?;
    let expr = match expression_parser::parse_with_max_depth(text, options.eval.max_depth) {
        Ok(expr) => expr,
        Err(e) => {
            eprintln!("error: {}", e.display_with_context(text));
            return Ok((&CalcError::from(e)).into());
        }
    };

    let declared: Vec<String> = if inputs.is_empty() {
        expr.referenced_series().into_iter().collect()
    } else {
        inputs.to_vec()
    };
    validate_expression(&expr, &declared, &options.eval)?;

    eprintln!("Parsed: {}", expr);
    print_json(&ExpressionDocument::from(&expr))?;
    Ok(ExitCode::SUCCESS)
}

pub fn write_output(path: &Path, series: &TimeSeries) -> Result<(), CalcError> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_intervals_to_file(path, &series.intervals)
    } else {
        let content = serde_json::to_string_pretty(series)?;
        fs::write(path, content).map_err(|e| CalcError::Storage {
            reason: format!("failed to write {}: {}", path.display(), e),
        })
    }
}

fn run_calculate(
    config_path: &Path,
    request_path: &Path,
    output_path: Option<&Path>,
) -> Result<ExitCode, CalcError> {
    let config = FileConfigAdapter::from_file(config_path)?;
    validate_logging_config(&config)?;
    let options = build_calc_options(&config)?;
    let data = data_config(&config)?;
    let request: CalculationRequest = read_json(request_path)?;

    let store = JsonStoreAdapter::new(
        data.series_dir.clone(),
        data.formula_dir.clone(),
        options.eval,
    );
    let outcome = match data.series_format {
        SeriesFormat::Json => run_calculation(&request, &store, &store, &options, None),
        SeriesFormat::Csv => {
            let series = CsvAdapter::new(data.series_dir.clone());
            run_calculation(&request, &store, &series, &options, None)
        }
    };

    if let (Some(path), Some(series)) = (output_path, outcome.output.as_ref()) {
        write_output(path, series)?;
        eprintln!("Output series written to {}", path.display());
    }

    print_json(&outcome.record)?;
    Ok(match outcome.record.status {
        CalculationStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(5),
    })
}

fn run_list_formulas(config_path: &Path) -> Result<ExitCode, CalcError> {
    let config = FileConfigAdapter::from_file(config_path)?;
    let options = build_calc_options(&config)?;
    let data = data_config(&config)?;
    let store = JsonStoreAdapter::new(data.series_dir, data.formula_dir, options.eval);

    let ids = store.list_formulas()?;
    if ids.is_empty() {
        eprintln!("No formulas found");
    } else {
        for id in &ids {
            println!("{}", id);
        }
        eprintln!("{} formulas found", ids.len());
    }
    Ok(ExitCode::SUCCESS)
}
