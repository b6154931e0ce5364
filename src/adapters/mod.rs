//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_store_adapter;

use crate::domain::error::CalcError;
use std::path::{Path, PathBuf};

/// `<dir>/<id>.<extension>`. Ids that could leave `dir` are refused.
pub(crate) fn document_path(dir: &Path, id: &str, extension: &str) -> Result<PathBuf, CalcError> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(CalcError::Storage {
            reason: format!("'{id}' is not a valid document id"),
        });
    }
    Ok(dir.join(format!("{id}.{extension}")))
}
