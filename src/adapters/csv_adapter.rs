//! CSV file adapter for every table the pipeline reads or writes.
//!
//! Readers check the header for required columns first, so a missing column
//! is reported by name instead of as a deserialization failure. Empty fields
//! read as missing values and missing values are written as empty fields.

use crate::domain::error::QuantlabError;
use crate::domain::factors::FactorRow;
use crate::domain::features::FeatureRow;
use crate::domain::intraday::{DailyClose, IntradayBar, IntradayRow};
use crate::domain::metrics::{Metrics, StrategyReturns};
use crate::domain::price::PriceBar;
use crate::domain::sentiment::SentimentRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const PRICES_FILE: &str = "sp500_prices.csv";
pub const FEATURES_FILE: &str = "features_monthly.csv";
pub const BETAS_FILE: &str = "features_with_betas.csv";
pub const CLUSTERED_FILE: &str = "features_clustered.csv";
pub const SENTIMENT_RETURNS_FILE: &str = "backtest_sentiment_daily.csv";
pub const INTRADAY_RETURNS_FILE: &str = "backtest_intraday.csv";
pub const CUMRET_FILE: &str = "strategy_cumret.csv";
pub const SUMMARY_FILE: &str = "strategy_summary.csv";

/// Layout of the data directory: raw inputs under `raw/`, stage outputs
/// under `processed/`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLayout {
    pub data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn raw(&self, file: &str) -> PathBuf {
        self.data_dir.join("raw").join(file)
    }

    pub fn processed(&self, file: &str) -> PathBuf {
        self.data_dir.join("processed").join(file)
    }

    pub fn cluster_returns(&self, cluster_id: usize) -> PathBuf {
        self.processed(&format!("backtest_cluster{cluster_id}_daily.csv"))
    }
}

/// The primary path when it exists, else the alternate.
pub fn resolve_input(primary: &Path, alternate: &Path) -> Result<PathBuf, QuantlabError> {
    if primary.exists() {
        return Ok(primary.to_path_buf());
    }
    if alternate.exists() {
        tracing::info!(path = %alternate.display(), "using alternate input location");
        return Ok(alternate.to_path_buf());
    }
    Err(QuantlabError::NotFound {
        path: format!("{} or {}", primary.display(), alternate.display()),
    })
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> QuantlabError {
    QuantlabError::Csv {
        file: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn open_reader(path: &Path, required: &[&str]) -> Result<csv::Reader<File>, QuantlabError> {
    if !path.exists() {
        return Err(QuantlabError::NotFound {
            path: path.display().to_string(),
        });
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(QuantlabError::MissingColumn {
                file: path.display().to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(reader)
}

fn read_records<T: for<'de> Deserialize<'de>>(path: &Path, required: &[&str]) -> Result<Vec<T>, QuantlabError> {
    let mut reader = open_reader(path, required)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|e| csv_error(path, e))
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>, QuantlabError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).map_err(|e| csv_error(path, e))
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<(), QuantlabError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = create_writer(path)?;
    writer.write_record(header).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.write_record(&row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}

/// Factor files date rows either by day or by month (`YYYYMM`, `YYYY-MM`).
fn parse_factor_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    parse_date(value)
        .or_else(|| NaiveDate::parse_from_str(&format!("{value}01"), "%Y%m%d").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok())
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z")
                .or_else(|_| DateTime::parse_from_rfc3339(value))
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn require_date(path: &Path, value: &str) -> Result<NaiveDate, QuantlabError> {
    parse_date(value).ok_or_else(|| csv_error(path, format!("invalid date `{value}`")))
}

// ---------------------------------------------------------------------------
// Prices

#[derive(Debug, Deserialize)]
struct PriceRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Ticker")]
    ticker: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    #[serde(rename = "adj close", default)]
    adj_close: Option<f64>,
    volume: Option<f64>,
}

/// Long-form daily prices. Rows missing any OHLCV value are skipped.
pub fn read_prices(path: &Path) -> Result<Vec<PriceBar>, QuantlabError> {
    let records: Vec<PriceRecord> =
        read_records(path, &["Date", "Ticker", "open", "high", "low", "close", "volume"])?;

    let mut bars = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for r in records {
        let date = require_date(path, &r.date)?;
        match (r.open, r.high, r.low, r.close, r.volume) {
            (Some(open), Some(high), Some(low), Some(close), Some(volume)) => bars.push(PriceBar {
                ticker: r.ticker,
                date,
                open,
                high,
                low,
                close,
                adj_close: r.adj_close,
                volume,
            }),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, file = %path.display(), "skipped incomplete price rows");
    }
    Ok(bars)
}

pub fn write_prices(path: &Path, bars: &[PriceBar]) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &["Date", "Ticker", "open", "high", "low", "close", "adj close", "volume"],
        bars.iter().map(|b| {
            vec![
                b.date.to_string(),
                b.ticker.clone(),
                b.open.to_string(),
                b.high.to_string(),
                b.low.to_string(),
                b.close.to_string(),
                fmt_opt(b.adj_close),
                b.volume.to_string(),
            ]
        }),
    )
}

// ---------------------------------------------------------------------------
// Feature tables

#[derive(Debug, Deserialize)]
struct FeatureRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Ticker")]
    ticker: String,
    gk_vol: Option<f64>,
    rsi: Option<f64>,
    bb_mavg: Option<f64>,
    bb_hband: Option<f64>,
    bb_lband: Option<f64>,
    atr: Option<f64>,
    macd_diff: Option<f64>,
    dollar_vol: Option<f64>,
    #[serde(default)]
    beta: Option<f64>,
    #[serde(default)]
    cluster: Option<usize>,
}

/// Which optional trailing columns a feature table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureTable {
    Monthly,
    WithBetas,
    Clustered,
}

/// Reads any of the three feature tables. `required` names the table that
/// must be present; later tables are supersets and also accepted.
pub fn read_features(path: &Path, required: FeatureTable) -> Result<Vec<FeatureRow>, QuantlabError> {
    let mut columns = vec!["Date", "Ticker"];
    columns.extend(crate::domain::features::FEATURE_COLUMNS);
    if matches!(required, FeatureTable::WithBetas | FeatureTable::Clustered) {
        columns.push("beta");
    }
    if required == FeatureTable::Clustered {
        columns.push("cluster");
    }

    let records: Vec<FeatureRecord> = read_records(path, &columns)?;
    records
        .into_iter()
        .map(|r| {
            Ok(FeatureRow {
                date: require_date(path, &r.date)?,
                ticker: r.ticker,
                gk_vol: r.gk_vol,
                rsi: r.rsi,
                bb_mavg: r.bb_mavg,
                bb_hband: r.bb_hband,
                bb_lband: r.bb_lband,
                atr: r.atr,
                macd_diff: r.macd_diff,
                dollar_vol: r.dollar_vol,
                beta: r.beta,
                cluster: r.cluster,
            })
        })
        .collect()
}

pub fn write_features(path: &Path, rows: &[FeatureRow], table: FeatureTable) -> Result<(), QuantlabError> {
    let mut header = vec!["Date", "Ticker"];
    header.extend(crate::domain::features::FEATURE_COLUMNS);
    let with_beta = matches!(table, FeatureTable::WithBetas | FeatureTable::Clustered);
    let with_cluster = table == FeatureTable::Clustered;
    if with_beta {
        header.push("beta");
    }
    if with_cluster {
        header.push("cluster");
    }

    write_rows(
        path,
        &header,
        rows.iter().map(|r| {
            let mut row = vec![r.date.to_string(), r.ticker.clone()];
            row.extend(r.feature_vector()[..8].iter().map(|v| fmt_opt(*v)));
            if with_beta {
                row.push(fmt_opt(r.beta));
            }
            if with_cluster {
                row.push(r.cluster.map(|c| c.to_string()).unwrap_or_default());
            }
            row
        }),
    )
}

// ---------------------------------------------------------------------------
// Factors

#[derive(Debug, Deserialize)]
struct FactorRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Mkt-RF")]
    mkt_rf: f64,
    #[serde(rename = "SMB", default)]
    smb: f64,
    #[serde(rename = "HML", default)]
    hml: f64,
    #[serde(rename = "RF")]
    rf: f64,
}

/// Monthly factor returns published in percent.
pub fn read_factors(path: &Path) -> Result<Vec<FactorRow>, QuantlabError> {
    let records: Vec<FactorRecord> = read_records(path, &["Date", "Mkt-RF", "RF"])?;
    records
        .into_iter()
        .map(|r| {
            let date = parse_factor_date(&r.date)
                .ok_or_else(|| csv_error(path, format!("invalid factor date `{}`", r.date)))?;
            Ok(FactorRow::from_percent(date, r.mkt_rf, r.smb, r.hml, r.rf))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sentiment

#[derive(Debug, Deserialize)]
struct SentimentCsvRecord {
    date: String,
    symbol: String,
    #[serde(rename = "twitterPosts", default)]
    posts: Option<f64>,
    #[serde(rename = "twitterComments", default)]
    comments: Option<f64>,
    #[serde(rename = "twitterLikes", default)]
    likes: Option<f64>,
    #[serde(rename = "twitterImpressions", default)]
    impressions: Option<f64>,
}

pub fn read_sentiment(path: &Path) -> Result<Vec<SentimentRecord>, QuantlabError> {
    let records: Vec<SentimentCsvRecord> = read_records(
        path,
        &["date", "symbol", "twitterPosts", "twitterComments", "twitterLikes", "twitterImpressions"],
    )?;
    records
        .into_iter()
        .map(|r| {
            Ok(SentimentRecord {
                date: require_date(path, &r.date)?,
                ticker: r.symbol,
                posts: r.posts,
                comments: r.comments,
                likes: r.likes,
                impressions: r.impressions,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Intraday inputs

#[derive(Debug, Deserialize)]
struct DailyRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Close")]
    close: Option<f64>,
}

pub fn read_daily_closes(path: &Path) -> Result<Vec<DailyClose>, QuantlabError> {
    let records: Vec<DailyRecord> = read_records(path, &["Date", "Close"])?;
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        let date = require_date(path, &r.date)?;
        if let Some(close) = r.close {
            out.push(DailyClose { date, close });
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct IntradayRecord {
    datetime: String,
    open: Option<f64>,
    close: Option<f64>,
}

pub fn read_intraday_bars(path: &Path) -> Result<Vec<IntradayBar>, QuantlabError> {
    let records: Vec<IntradayRecord> = read_records(path, &["datetime", "open", "close"])?;
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        let timestamp = parse_timestamp(&r.datetime)
            .ok_or_else(|| csv_error(path, format!("invalid timestamp `{}`", r.datetime)))?;
        if let (Some(open), Some(close)) = (r.open, r.close) {
            out.push(IntradayBar { timestamp, open, close });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Strategy returns

pub fn write_cluster_returns(path: &Path, daily: &[(NaiveDate, f64)], cluster_id: usize) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &["Date", "return", "cluster"],
        daily
            .iter()
            .map(|(d, r)| vec![d.to_string(), r.to_string(), cluster_id.to_string()]),
    )
}

pub fn write_sentiment_returns(path: &Path, daily: &[(NaiveDate, f64)]) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &["Date", "sentiment_return"],
        daily.iter().map(|(d, r)| vec![d.to_string(), r.to_string()]),
    )
}

pub fn write_intraday(path: &Path, rows: &[IntradayRow]) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &["Date", "pred_vol", "intraday_mom", "pos", "strategy_ret"],
        rows.iter().map(|r| {
            vec![
                r.date.to_string(),
                r.pred_vol.to_string(),
                r.intraday_mom.to_string(),
                r.pos.to_string(),
                r.strategy_ret.to_string(),
            ]
        }),
    )
}

/// One return column keyed by `Date`. Rows with an empty value are skipped.
pub fn read_return_series(path: &Path, column: &str) -> Result<Vec<(NaiveDate, f64)>, QuantlabError> {
    let mut reader = open_reader(path, &["Date", column])?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
    let date_idx = headers.iter().position(|h| h == "Date").unwrap_or(0);
    let value_idx = headers.iter().position(|h| h == column).unwrap_or(1);

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let date = require_date(path, record.get(date_idx).unwrap_or_default())?;
        let raw = record.get(value_idx).unwrap_or_default().trim();
        if raw.is_empty() {
            continue;
        }
        let value: f64 = raw
            .parse()
            .map_err(|e| csv_error(path, format!("invalid {column} value `{raw}`: {e}")))?;
        out.push((date, value));
    }
    Ok(out)
}

pub fn write_cumulative(path: &Path, strategies: &[StrategyReturns]) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &["Date", "strategy", "cumulative_return"],
        strategies.iter().flat_map(|s| {
            s.cumulative()
                .into_iter()
                .map(|(d, c)| vec![d.to_string(), s.name.clone(), c.to_string()])
        }),
    )
}

pub fn write_summary(path: &Path, summary: &[(String, Metrics)]) -> Result<(), QuantlabError> {
    write_rows(
        path,
        &[
            "strategy",
            "observations",
            "total_return",
            "annualized_return",
            "sharpe_ratio",
            "max_drawdown",
            "max_drawdown_duration",
        ],
        summary.iter().map(|(name, m)| {
            vec![
                name.clone(),
                m.observations.to_string(),
                m.total_return.to_string(),
                m.annualized_return.to_string(),
                m.sharpe_ratio.to_string(),
                m.max_drawdown.to_string(),
                m.max_drawdown_duration.to_string(),
            ]
        }),
    )
}
