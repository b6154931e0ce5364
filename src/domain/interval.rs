//! Metering intervals and the time series that carry them.
//!
//! Quantities cross every boundary as fixed-precision decimal strings
//! (`"123.450"`); arithmetic happens on `f64` in between.

use crate::domain::error::CalcError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Fractional digits of a quantity at the boundary unless configured otherwise.
pub const QUANTITY_DECIMALS: usize = 3;
/// Upper bound on the fractional digits a quantity is written with.
pub const MAX_QUANTITY_DECIMALS: usize = 9;

/// A metered value and the number of fractional digits it is written with.
///
/// Equality and ordering look at the value only.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: f64,
    decimals: u8,
}

impl Quantity {
    pub fn new(value: f64) -> Self {
        Self::with_decimals(value, QUANTITY_DECIMALS)
    }

    fn with_decimals(value: f64, decimals: usize) -> Self {
        Self {
            value,
            decimals: decimals.min(MAX_QUANTITY_DECIMALS) as u8,
        }
    }

    pub fn value(self) -> f64 {
        self.value
    }

    pub fn decimals(self) -> usize {
        usize::from(self.decimals)
    }

    /// Round to `decimals` fractional digits by going through the decimal text,
    /// so the stored value is exactly what a reader of the string would parse.
    /// The quantity is written back with the same number of digits.
    pub fn rounded(value: f64, decimals: usize) -> Self {
        let decimals = decimals.min(MAX_QUANTITY_DECIMALS);
        let text = format_quantity(value, decimals);
        Self::with_decimals(text.parse().unwrap_or(value), decimals)
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_quantity(self.value, self.decimals()))
    }
}

impl FromStr for Quantity {
    type Err = CalcError;

    /// Keeps the fractional digits of the text, so `"10.5"` is written back
    /// as `"10.5"`. Exponent notation falls back to the default digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_quantity(s)?;
        let trimmed = s.trim();
        let decimals = if trimmed.contains(['e', 'E']) {
            QUANTITY_DECIMALS
        } else {
            trimmed.split_once('.').map_or(0, |(_, frac)| frac.len())
        };
        Ok(Self::with_decimals(value, decimals))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(v) if v.is_finite() => Ok(Self::new(v)),
            Raw::Number(v) => Err(serde::de::Error::custom(format!(
                "invalid quantity '{v}'"
            ))),
        }
    }
}

/// Format `value` with exactly `decimals` fractional digits. A result that
/// rounds to zero never carries a minus sign.
pub fn format_quantity(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

pub fn parse_quantity(text: &str) -> Result<f64, CalcError> {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CalcError::InvalidQuantity {
            value: text.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Validated,
    Preliminary,
    Estimated,
    Substituted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub position: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity: Quantity,
    pub quality: Quality,
}

impl Interval {
    pub fn value(&self) -> f64 {
        self.quantity.value()
    }
}

/// Fixed interval length of a series, written as an ISO-8601 duration
/// (`PT15M`, `PT1H`, `P1D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution(TimeDelta);

impl Resolution {
    /// `None` for zero or negative lengths.
    pub fn from_duration(duration: TimeDelta) -> Option<Self> {
        (duration > TimeDelta::zero()).then_some(Self(duration))
    }

    pub fn duration(self) -> TimeDelta {
        self.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds();
        if total % 86_400 == 0 {
            return write!(f, "P{}D", total / 86_400);
        }
        write!(f, "P")?;
        let days = total / 86_400;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        write!(f, "T")?;
        let (h, m, s) = ((total % 86_400) / 3_600, (total % 3_600) / 60, total % 60);
        if h > 0 {
            write!(f, "{h}H")?;
        }
        if m > 0 {
            write!(f, "{m}M")?;
        }
        if s > 0 {
            write!(f, "{s}S")?;
        }
        Ok(())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('P')
            .ok_or_else(|| format!("resolution '{s}' must start with 'P'"))?;
        let mut seconds: i64 = 0;
        let mut digits = String::new();
        let mut in_time = false;

        for ch in body.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                'T' if !in_time && digits.is_empty() => in_time = true,
                'D' | 'H' | 'M' | 'S' => {
                    let n: i64 = digits
                        .parse()
                        .map_err(|_| format!("resolution '{s}' has a unit without a number"))?;
                    digits.clear();
                    let unit = match (in_time, ch) {
                        (false, 'D') => 86_400,
                        (true, 'H') => 3_600,
                        (true, 'M') => 60,
                        (true, 'S') => 1,
                        _ => return Err(format!("unsupported unit '{ch}' in resolution '{s}'")),
                    };
                    seconds = n
                        .checked_mul(unit)
                        .and_then(|part| seconds.checked_add(part))
                        .ok_or_else(|| format!("resolution '{s}' is too long"))?;
                }
                _ => return Err(format!("unexpected '{ch}' in resolution '{s}'")),
            }
        }

        if !digits.is_empty() || seconds <= 0 {
            return Err(format!("invalid resolution '{s}'"));
        }
        TimeDelta::try_seconds(seconds)
            .map(Self)
            .ok_or_else(|| format!("resolution '{s}' is too long"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub time_series_id: String,
    #[serde(default)]
    pub market_location_id: Option<String>,
    #[serde(default)]
    pub measurement_type: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default)]
    pub period: Option<Period>,
    pub intervals: Vec<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

pub(crate) fn default_unit() -> String {
    "KWH".to_string()
}

pub(crate) fn default_resolution() -> String {
    "PT15M".to_string()
}

impl TimeSeries {
    /// Check that positions run 1..=N and that the windows tile time without
    /// gaps or overlaps. When the resolution is parseable every window must be
    /// exactly one resolution long.
    pub fn validate(&self) -> Result<(), CalcError> {
        let resolution = self.resolution.parse::<Resolution>().ok();
        validate_intervals(&self.time_series_id, &self.intervals, resolution)
    }
}

pub fn validate_intervals(
    series: &str,
    intervals: &[Interval],
    resolution: Option<Resolution>,
) -> Result<(), CalcError> {
    let invalid = |reason: String| CalcError::InvalidSeries {
        series: series.to_string(),
        reason,
    };

    for (i, interval) in intervals.iter().enumerate() {
        let expected = i + 1;
        if interval.position as usize != expected {
            return Err(invalid(format!(
                "position {} found where {} was expected",
                interval.position, expected
            )));
        }
        if interval.end <= interval.start {
            return Err(invalid(format!(
                "interval {} ends before it starts",
                interval.position
            )));
        }
        if let Some(res) = resolution {
            if interval.end - interval.start != res.duration() {
                return Err(invalid(format!(
                    "interval {} does not match the series resolution",
                    interval.position
                )));
            }
        }
    }

    for pair in intervals.windows(2) {
        if pair[0].end != pair[1].start {
            return Err(invalid(format!(
                "gap or overlap between positions {} and {}",
                pair[0].position, pair[1].position
            )));
        }
    }
    Ok(())
}
