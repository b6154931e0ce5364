//! mabis-calc: formula calculation over energy-metering interval series.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! file-backed implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
