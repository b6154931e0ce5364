//! CSV interval data adapter.
//!
//! One file per series, `<series id>.csv`, with the columns
//! `position,start,end,quantity,quality`. CSV carries no series metadata, so
//! the unit falls back to `KWH` and the resolution is taken from the first
//! interval's length.

use crate::adapters::document_path;
use crate::domain::error::CalcError;
use crate::domain::interval::{
    Interval, Period, Quality, Quantity, Resolution, TimeSeries, default_resolution, default_unit,
};
use crate::ports::series_port::SeriesPort;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct IntervalRow {
    position: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    quantity: String,
    quality: Quality,
}

impl From<&Interval> for IntervalRow {
    fn from(interval: &Interval) -> Self {
        Self {
            position: interval.position,
            start: interval.start,
            end: interval.end,
            quantity: interval.quantity.to_string(),
            quality: interval.quality,
        }
    }
}

impl TryFrom<IntervalRow> for Interval {
    type Error = CalcError;

    fn try_from(row: IntervalRow) -> Result<Self, Self::Error> {
        Ok(Self {
            position: row.position,
            start: row.start,
            end: row.end,
            quantity: row.quantity.parse::<Quantity>()?,
            quality: row.quality,
        })
    }
}

pub fn read_intervals<R: io::Read>(reader: R) -> Result<Vec<Interval>, CalcError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut intervals = Vec::new();
    for row in rdr.deserialize::<IntervalRow>() {
        intervals.push(Interval::try_from(row?)?);
    }
    Ok(intervals)
}

pub fn write_intervals<W: io::Write>(writer: W, intervals: &[Interval]) -> Result<(), CalcError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for interval in intervals {
        wtr.serialize(IntervalRow::from(interval))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_intervals_to_file(path: &Path, intervals: &[Interval]) -> Result<(), CalcError> {
    let file = fs::File::create(path).map_err(|e| CalcError::Storage {
        reason: format!("failed to create {}: {}", path.display(), e),
    })?;
    write_intervals(file, intervals)
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, series_id: &str) -> Result<PathBuf, CalcError> {
        document_path(&self.base_path, series_id, "csv")
    }
}

impl SeriesPort for CsvAdapter {
    fn fetch_series(&self, series_id: &str) -> Result<TimeSeries, CalcError> {
        let path = self.csv_path(series_id)?;
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CalcError::SeriesNotFound {
                    id: series_id.to_string(),
                });
            }
            Err(e) => {
                return Err(CalcError::Storage {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let intervals = read_intervals(file)?;
        let resolution = intervals
            .first()
            .and_then(|i| Resolution::from_duration(i.end - i.start))
            .map_or_else(default_resolution, |r| r.to_string());
        let period = match (intervals.first(), intervals.last()) {
            (Some(first), Some(last)) => Some(Period {
                start: first.start,
                end: last.end,
            }),
            _ => None,
        };
        tracing::debug!(series = series_id, intervals = intervals.len(), "read CSV series");

        Ok(TimeSeries {
            time_series_id: series_id.to_string(),
            market_location_id: None,
            measurement_type: None,
            unit: default_unit(),
            resolution,
            period,
            intervals,
            metadata: None,
        })
    }

    fn store_series(&self, series: &TimeSeries) -> Result<(), CalcError> {
        let path = self.csv_path(&series.time_series_id)?;
        fs::create_dir_all(&self.base_path).map_err(|e| CalcError::Storage {
            reason: format!(
                "failed to create directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;
        write_intervals_to_file(&path, &series.intervals)?;
        tracing::debug!(series = %series.time_series_id, path = %path.display(), "wrote CSV series");
        Ok(())
    }
}
