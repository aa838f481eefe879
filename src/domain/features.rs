//! Daily technical features and their monthly aggregation.
//!
//! Indicators run per ticker on the ticker's own history. Month rows take the
//! mean of `gk_vol`, `atr` and `dollar_vol` and the last available value of the
//! remaining indicators, then each month keeps the most liquid `top_n` tickers.

use crate::domain::calendar::month_end;
use crate::domain::indicator::{
    calculate_atr, calculate_bollinger, calculate_macd, calculate_rsi, macd,
};
use crate::domain::panel::TickerSeries;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const FEATURE_COLUMNS: [&str; 8] = [
    "gk_vol",
    "rsi",
    "bb_mavg",
    "bb_hband",
    "bb_lband",
    "atr",
    "macd_diff",
    "dollar_vol",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub top_n: usize,
    pub rsi_window: usize,
    pub bb_window: usize,
    pub bb_dev: f64,
    pub atr_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            top_n: 50,
            rsi_window: 14,
            bb_window: 20,
            bb_dev: 2.0,
            atr_window: 14,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
        }
    }
}

/// One (month end, ticker) row. The same record flows through the beta and
/// clustering stages, which fill `beta` and `cluster`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub gk_vol: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_mavg: Option<f64>,
    pub bb_hband: Option<f64>,
    pub bb_lband: Option<f64>,
    pub atr: Option<f64>,
    pub macd_diff: Option<f64>,
    pub dollar_vol: Option<f64>,
    pub beta: Option<f64>,
    pub cluster: Option<usize>,
}

impl FeatureRow {
    pub fn new(date: NaiveDate, ticker: impl Into<String>) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            gk_vol: None,
            rsi: None,
            bb_mavg: None,
            bb_hband: None,
            bb_lband: None,
            atr: None,
            macd_diff: None,
            dollar_vol: None,
            beta: None,
            cluster: None,
        }
    }

    /// Feature values in `FEATURE_COLUMNS` order, followed by beta.
    pub fn feature_vector(&self) -> [Option<f64>; 9] {
        [
            self.gk_vol,
            self.rsi,
            self.bb_mavg,
            self.bb_hband,
            self.bb_lband,
            self.atr,
            self.macd_diff,
            self.dollar_vol,
            self.beta,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyFeatures {
    pub date: NaiveDate,
    pub gk_vol: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_mavg: Option<f64>,
    pub bb_hband: Option<f64>,
    pub bb_lband: Option<f64>,
    pub atr: Option<f64>,
    pub macd_diff: Option<f64>,
    pub dollar_vol: Option<f64>,
}

pub fn compute_daily_features(series: &TickerSeries, config: &FeatureConfig) -> Vec<DailyFeatures> {
    let bars = &series.bars;
    let rsi = calculate_rsi(bars, config.rsi_window);
    let bollinger = calculate_bollinger(bars, config.bb_window, config.bb_dev);
    let atr = calculate_atr(bars, config.atr_window);
    let macd = calculate_macd(bars, config.macd_fast, config.macd_slow, config.macd_signal);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let bands = bollinger.bands_at(i);
            let dollar_vol = bar.dollar_volume();
            DailyFeatures {
                date: bar.date,
                gk_vol: bar.garman_klass(),
                rsi: rsi.simple_at(i),
                bb_mavg: bands.map(|(_, m, _)| m),
                bb_hband: bands.map(|(u, _, _)| u),
                bb_lband: bands.map(|(_, _, l)| l),
                atr: atr.simple_at(i),
                macd_diff: macd.histogram_at(i),
                dollar_vol: dollar_vol.is_finite().then_some(dollar_vol),
            }
        })
        .collect()
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn last_of(values: impl DoubleEndedIterator<Item = Option<f64>>) -> Option<f64> {
    values.rev().flatten().next()
}

/// Collapse one ticker's daily features into month-end rows.
pub fn aggregate_monthly(ticker: &str, daily: &[DailyFeatures]) -> Vec<FeatureRow> {
    let mut months: BTreeMap<NaiveDate, Vec<&DailyFeatures>> = BTreeMap::new();
    for day in daily {
        months.entry(month_end(day.date)).or_default().push(day);
    }

    months
        .into_iter()
        .map(|(date, days)| {
            let mut row = FeatureRow::new(date, ticker);
            row.gk_vol = mean_of(days.iter().map(|d| d.gk_vol));
            row.rsi = last_of(days.iter().map(|d| d.rsi));
            row.bb_mavg = last_of(days.iter().map(|d| d.bb_mavg));
            row.bb_hband = last_of(days.iter().map(|d| d.bb_hband));
            row.bb_lband = last_of(days.iter().map(|d| d.bb_lband));
            row.atr = mean_of(days.iter().map(|d| d.atr));
            row.macd_diff = last_of(days.iter().map(|d| d.macd_diff));
            row.dollar_vol = mean_of(days.iter().map(|d| d.dollar_vol));
            row
        })
        .collect()
}

/// Descending by dollar volume with missing values last.
fn by_dollar_volume_desc(a: &FeatureRow, b: &FeatureRow) -> Ordering {
    match (a.dollar_vol, b.dollar_vol) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keep the `top_n` rows per month by dollar volume; output is sorted by
/// date, then by dollar volume descending.
pub fn select_top_liquid(rows: Vec<FeatureRow>, top_n: usize) -> Vec<FeatureRow> {
    let mut by_month: BTreeMap<NaiveDate, Vec<FeatureRow>> = BTreeMap::new();
    for row in rows {
        by_month.entry(row.date).or_default().push(row);
    }

    by_month
        .into_values()
        .flat_map(|mut month| {
            month.sort_by(|a, b| by_dollar_volume_desc(a, b).then_with(|| a.ticker.cmp(&b.ticker)));
            month.truncate(top_n);
            month
        })
        .collect()
}

pub fn compute_features(series: &[TickerSeries], config: &FeatureConfig) -> Vec<FeatureRow> {
    let monthly: Vec<FeatureRow> = series
        .iter()
        .flat_map(|s| aggregate_monthly(&s.ticker, &compute_daily_features(s, config)))
        .collect();
    select_top_liquid(monthly, config.top_n)
}
