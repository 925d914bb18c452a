//! Core domain types and logic.

pub mod analytics;
pub mod bar;
pub mod config_validation;
pub mod error;
pub mod features;
pub mod grid;
pub mod indicator;
pub mod interval;
pub mod pair;
pub mod series;
pub mod signal;
pub mod simulator;
pub mod strategies;
pub mod sweep;
pub mod trade;
pub mod trend;
