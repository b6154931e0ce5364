//! Port traits for the collaborators the calculation core depends on.

pub mod config_port;
pub mod formula_port;
pub mod series_port;
