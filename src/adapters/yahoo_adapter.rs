//! HTTP market data adapter: index constituents from the Wikipedia listing
//! page, daily history from the Yahoo Finance chart endpoint.

use crate::domain::error::QuantlabError;
use crate::domain::price::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TICKERS_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";
pub const DEFAULT_HISTORY_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) quantlab/0.1";

pub struct YahooAdapter {
    client: reqwest::blocking::Client,
    tickers_url: String,
    history_url: String,
}

impl YahooAdapter {
    pub fn new(tickers_url: &str, history_url: &str, timeout_secs: u64) -> Result<Self, QuantlabError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| QuantlabError::DataSource {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            tickers_url: tickers_url.to_string(),
            history_url: history_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_text(&self, url: &str) -> Result<String, QuantlabError> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| QuantlabError::DataSource {
                reason: format!("GET {url}: {e}"),
            })?;
        response.text().map_err(|e| QuantlabError::DataSource {
            reason: format!("reading body of {url}: {e}"),
        })
    }
}

impl DataPort for YahooAdapter {
    fn list_constituents(&self) -> Result<Vec<String>, QuantlabError> {
        let html = self.get_text(&self.tickers_url)?;
        parse_constituents(&html)
    }

    fn fetch_daily(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantlabError> {
        let period1 = start_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let url = format!(
            "{}/{ticker}?period1={period1}&period2={period2}&interval=1d&events=history&includeAdjustedClose=true",
            self.history_url
        );
        let body = self.get_text(&url)?;
        parse_chart(ticker, &body)
    }
}

/// First-column symbols of the `constituents` table.
pub fn parse_constituents(html: &str) -> Result<Vec<String>, QuantlabError> {
    let start = html
        .find("id=\"constituents\"")
        .ok_or_else(|| QuantlabError::DataSource {
            reason: "listing page has no constituents table".into(),
        })?;
    let table = &html[start..];
    let table = &table[..table.find("</table>").unwrap_or(table.len())];

    let symbols = table
        .split("<tr")
        .skip(1)
        .filter_map(|row| {
            let cell_start = row.find("<td")?;
            let cell = &row[cell_start..];
            let open_end = cell.find('>')? + 1;
            let close = cell.find("</td>").unwrap_or(cell.len());
            let text = strip_tags(&cell[open_end..close]);
            (!text.is_empty()).then_some(text)
        })
        .collect();
    Ok(symbols)
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

/// Daily bars from a chart response. Days with any missing OHLCV value are
/// dropped.
pub fn parse_chart(ticker: &str, body: &str) -> Result<Vec<PriceBar>, QuantlabError> {
    let response: ChartResponse = serde_json::from_str(body).map_err(|e| QuantlabError::DataSource {
        reason: format!("{ticker}: malformed chart response: {e}"),
    })?;

    if let Some(err) = response.chart.error {
        return Err(QuantlabError::DataSource {
            reason: format!(
                "{ticker}: {} {}",
                err.code.unwrap_or_default(),
                err.description.unwrap_or_default()
            ),
        });
    }
    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.first() else {
        return Ok(Vec::new());
    };
    let adj = result.indicators.adjclose.first().map(|a| a.adjclose.as_slice()).unwrap_or(&[]);

    let bars = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PriceBar {
                ticker: ticker.to_string(),
                date,
                open: at(&quote.open, i)?,
                high: at(&quote.high, i)?,
                low: at(&quote.low, i)?,
                close: at(&quote.close, i)?,
                adj_close: at(adj, i),
                volume: at(&quote.volume, i)?,
            })
        })
        .collect();
    Ok(bars)
}
