//! Logging setup for the binary.
//!
//! Library code only emits `tracing` events; the subscriber is installed once
//! here. `RUST_LOG` wins over the level derived from flags and config.

use crate::domain::error::CalcError;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(CalcError::ConfigInvalid {
                section: "logging".to_string(),
                key: "format".to_string(),
                reason: format!("unknown log format '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// `-v` raises the level one step per occurrence, starting above the
/// configured one.
pub fn level_for_verbosity(base: &str, verbosity: u8) -> String {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let start = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(base.trim()))
        .unwrap_or(1);
    let index = (start + verbosity as usize).min(LEVELS.len() - 1);
    LEVELS[index].to_string()
}

fn build_filter(level: &str) -> Result<EnvFilter, CalcError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| CalcError::ConfigInvalid {
        section: "logging".to_string(),
        key: "level".to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. Events go to stderr so stdout stays
/// machine-readable. A subscriber that is already installed is kept.
pub fn init(settings: &LogSettings) -> Result<(), CalcError> {
    let filter = build_filter(&settings.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match settings.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
    Ok(())
}
