//! Time series storage port trait.

use crate::domain::error::CalcError;
use crate::domain::interval::TimeSeries;

pub trait SeriesPort {
    fn fetch_series(&self, series_id: &str) -> Result<TimeSeries, CalcError>;

    /// Store a series under its `time_series_id`, replacing any previous one.
    fn store_series(&self, series: &TimeSeries) -> Result<(), CalcError>;
}
