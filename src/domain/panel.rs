//! Per-ticker price series and the cross-sectional return panel.
//!
//! The raw price file is long-form (one row per date and ticker). Stages that
//! need per-ticker history group it into [`TickerSeries`]; stages that trade
//! portfolios work on a [`ReturnPanel`] keyed by ticker and date.

use crate::domain::price::PriceBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct TickerSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl TickerSeries {
    /// Bars are sorted by date; a repeated date keeps the last bar seen.
    pub fn new(ticker: String, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by(|later, earlier| {
            if later.date == earlier.date {
                std::mem::swap(later, earlier);
                true
            } else {
                false
            }
        });
        Self { ticker, bars }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }
}

/// Split long-form bars into per-ticker series, ordered by ticker.
pub fn group_by_ticker(bars: Vec<PriceBar>) -> Vec<TickerSeries> {
    let mut grouped: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();
    for bar in bars {
        grouped.entry(bar.ticker.clone()).or_default().push(bar);
    }
    grouped
        .into_iter()
        .map(|(ticker, bars)| TickerSeries::new(ticker, bars))
        .collect()
}

/// Which price column drives returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Close,
    AdjustedOrClose,
}

impl PriceField {
    fn pick(self, bar: &PriceBar) -> f64 {
        match self {
            PriceField::Close => bar.close,
            PriceField::AdjustedOrClose => bar.adjusted_or_close(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReturnPanel {
    prices: HashMap<String, BTreeMap<NaiveDate, f64>>,
    returns: HashMap<String, BTreeMap<NaiveDate, f64>>,
    return_dates: Vec<NaiveDate>,
}

impl ReturnPanel {
    /// Daily returns are percent changes against the ticker's previous
    /// available price, so gaps in one ticker do not blank its next return.
    pub fn from_series(series: &[TickerSeries], field: PriceField) -> Self {
        let mut prices = HashMap::new();
        let mut returns = HashMap::new();
        let mut dates = BTreeSet::new();

        for s in series {
            let px: BTreeMap<NaiveDate, f64> = s
                .bars
                .iter()
                .map(|b| (b.date, field.pick(b)))
                .filter(|(_, p)| p.is_finite())
                .collect();

            let rets: BTreeMap<NaiveDate, f64> = px
                .iter()
                .zip(px.iter().skip(1))
                .filter(|((_, prev), _)| **prev != 0.0)
                .map(|((_, prev), (date, curr))| (*date, curr / prev - 1.0))
                .collect();

            dates.extend(rets.keys().copied());
            prices.insert(s.ticker.clone(), px);
            returns.insert(s.ticker.clone(), rets);
        }

        Self {
            prices,
            returns,
            return_dates: dates.into_iter().collect(),
        }
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.prices.contains_key(ticker)
    }

    pub fn tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.prices.keys().map(String::as_str).collect();
        tickers.sort_unstable();
        tickers
    }

    pub fn return_on(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.returns.get(ticker)?.get(&date).copied()
    }

    /// Dates with at least one return inside `[start, end]`.
    pub fn return_dates_between(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.return_dates.partition_point(|d| *d < start);
        let hi = self.return_dates.partition_point(|d| *d <= end);
        &self.return_dates[lo..hi.max(lo)]
    }

    /// Price matrix (one column per ticker) over dates `<= end` on which
    /// every ticker has a price.
    pub fn aligned_prices(&self, tickers: &[String], end: NaiveDate) -> Vec<Vec<f64>> {
        let Some(first) = tickers.first().and_then(|t| self.prices.get(t)) else {
            return Vec::new();
        };

        first
            .range(..=end)
            .filter_map(|(date, _)| {
                tickers
                    .iter()
                    .map(|t| self.prices.get(t)?.get(date).copied())
                    .collect::<Option<Vec<f64>>>()
            })
            .collect()
    }

    /// Weighted daily portfolio returns over `[start, end]`. A ticker with no
    /// return on a date contributes nothing to that day.
    pub fn portfolio_returns(
        &self,
        weights: &[(String, f64)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<(NaiveDate, f64)> {
        self.return_dates_between(start, end)
            .iter()
            .map(|&date| {
                let r = weights
                    .iter()
                    .filter_map(|(t, w)| self.return_on(t, date).map(|r| r * w))
                    .sum();
                (date, r)
            })
            .collect()
    }
}
