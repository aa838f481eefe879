#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use quantlab::adapters::file_config_adapter::FileConfigAdapter;
use quantlab::domain::error::QuantlabError;
pub use quantlab::domain::price::PriceBar;
use quantlab::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockDataPort {
    pub listing: Vec<String>,
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            listing: Vec::new(),
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_listing(mut self, symbols: &[&str]) -> Self {
        self.listing = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn list_constituents(&self) -> Result<Vec<String>, QuantlabError> {
        Ok(self.listing.clone())
    }

    fn fetch_daily(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantlabError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(QuantlabError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Weekdays starting at `start`.
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

pub fn make_bar(ticker: &str, date: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        ticker: ticker.to_string(),
        date,
        open: close * 0.995,
        high: close * 1.01,
        low: close * 0.99,
        close,
        adj_close: Some(close),
        volume: 1_000_000.0,
    }
}

/// Deterministic wavy price path. `seed` shifts phase, drift and volume so
/// tickers differ from each other.
pub fn generate_bars(ticker: &str, days: &[NaiveDate], seed: usize) -> Vec<PriceBar> {
    let s = seed as f64;
    days.iter()
        .enumerate()
        .map(|(i, d)| {
            let t = i as f64;
            let close = (50.0 + 10.0 * s)
                * (1.0 + 0.0004 * (s - 2.0) * t / 10.0)
                * (1.0 + 0.08 * (t / (9.0 + s) + s).sin() + 0.02 * (t * 0.7 + s * 1.3).cos());
            let mut bar = make_bar(ticker, *d, close);
            bar.high = close * (1.005 + 0.002 * ((t + s) * 0.3).sin().abs());
            bar.low = close * (0.995 - 0.002 * ((t * 0.5 + s).cos()).abs());
            bar.volume = 1_000_000.0 + 150_000.0 * s + 10_000.0 * (t * 0.1).sin();
            bar
        })
        .collect()
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Configuration rooted at `data_dir`, with extra INI text appended.
pub fn config_for(data_dir: &Path, extra: &str) -> FileConfigAdapter {
    let ini = format!("[paths]\ndata_dir = {}\n{extra}", data_dir.display());
    FileConfigAdapter::from_string(&ini).unwrap()
}
