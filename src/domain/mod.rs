//! Core domain types and logic.

pub mod error;
pub mod interval;
pub mod expression;
pub mod expression_parser;
pub mod formula_builder;
pub mod evaluator;
pub mod calculator;
pub mod calculation;
pub mod config_validation;
