//! Raw price ingestion over a [`DataPort`].

use crate::domain::error::QuantlabError;
use crate::domain::price::PriceBar;
use crate::domain::universe::normalize_listing;
use crate::ports::data_port::DataPort;
use chrono::{Duration, NaiveDate};

/// Download window ending at `today`, `years` calendar years of 365 days back.
pub fn history_window(today: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(365 * i64::from(years)), today)
}

/// The configured ticker list when present, otherwise the source listing.
pub fn resolve_universe(port: &dyn DataPort, configured: Option<Vec<String>>) -> Result<Vec<String>, QuantlabError> {
    match configured {
        Some(tickers) => Ok(tickers),
        None => Ok(normalize_listing(port.list_constituents()?)?),
    }
}

/// Download every ticker, skipping failures. Fails only when nothing at all
/// was retrieved. Output is sorted by (date, ticker).
pub fn fetch_prices(
    port: &dyn DataPort,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PriceBar>, QuantlabError> {
    let mut bars = Vec::new();
    let mut failed = 0usize;
    for (i, ticker) in tickers.iter().enumerate() {
        match port.fetch_daily(ticker, start, end) {
            Ok(mut series) if !series.is_empty() => {
                tracing::debug!(ticker = %ticker, bars = series.len(), n = i + 1, of = tickers.len(), "downloaded");
                bars.append(&mut series);
            }
            Ok(_) => {
                failed += 1;
                tracing::warn!(ticker = %ticker, "no price history returned");
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(ticker = %ticker, error = %e, "download failed");
            }
        }
    }

    if bars.is_empty() {
        return Err(QuantlabError::NoData {
            reason: format!("no price history for any of {} tickers", tickers.len()),
        });
    }
    tracing::info!(tickers = tickers.len() - failed, failed, rows = bars.len(), "price download complete");

    bars.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.ticker.cmp(&b.ticker)));
    Ok(bars)
}
