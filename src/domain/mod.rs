//! Core domain types and pipeline stage logic.

pub mod error;
pub mod price;
pub mod calendar;
pub mod indicator;
pub mod universe;
pub mod panel;
pub mod ingest;
pub mod features;
pub mod factors;
pub mod clustering;
pub mod optimizer;
pub mod backtest;
pub mod sentiment;
pub mod garch;
pub mod intraday;
pub mod metrics;
pub mod config_validation;
