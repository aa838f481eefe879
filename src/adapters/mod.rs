//! Concrete adapter implementations for ports, plus file and chart output.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod svg_chart;
pub mod yahoo_adapter;
