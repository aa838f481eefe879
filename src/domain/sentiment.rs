//! Social-engagement strategy: hold the most-discussed tickers of each month
//! in equal weight over the following month.

use crate::domain::calendar::{month_end, next_month_range};
use crate::domain::panel::ReturnPanel;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DEFAULT_TOP_N: usize = 20;

/// One daily row of the social-media dataset. Missing counts are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub posts: Option<f64>,
    pub comments: Option<f64>,
    pub likes: Option<f64>,
    pub impressions: Option<f64>,
}

impl SentimentRecord {
    /// Sum of the interaction counts that are present.
    pub fn engagement(&self) -> f64 {
        [self.likes, self.posts, self.comments, self.impressions]
            .iter()
            .flatten()
            .sum()
    }
}

/// Mean daily engagement per (month end, ticker).
pub fn monthly_engagement(records: &[SentimentRecord]) -> BTreeMap<NaiveDate, BTreeMap<String, f64>> {
    let mut acc: BTreeMap<NaiveDate, BTreeMap<String, (f64, usize)>> = BTreeMap::new();
    for rec in records {
        let slot = acc
            .entry(month_end(rec.date))
            .or_default()
            .entry(rec.ticker.clone())
            .or_insert((0.0, 0));
        slot.0 += rec.engagement();
        slot.1 += 1;
    }
    acc.into_iter()
        .map(|(month, tickers)| {
            let means = tickers
                .into_iter()
                .map(|(t, (sum, n))| (t, sum / n as f64))
                .collect();
            (month, means)
        })
        .collect()
}

/// The `top_n` tickers by engagement, highest first. Ties break by ticker.
pub fn top_by_engagement(month: &BTreeMap<String, f64>, top_n: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = month.iter().map(|(t, e)| (t, *e)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(top_n).map(|(t, _)| t.clone()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentMonth {
    pub date: NaiveDate,
    pub tickers: Vec<String>,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SentimentBacktest {
    pub daily: Vec<(NaiveDate, f64)>,
    pub months: Vec<SentimentMonth>,
}

pub fn run_sentiment_backtest(records: &[SentimentRecord], panel: &ReturnPanel, top_n: usize) -> SentimentBacktest {
    let mut result = SentimentBacktest::default();

    for (month, engagement) in monthly_engagement(records) {
        let longs: Vec<String> = top_by_engagement(&engagement, top_n)
            .into_iter()
            .filter(|t| panel.has_ticker(t))
            .collect();
        if longs.is_empty() {
            tracing::warn!(%month, "no valid tickers after filtering against price data");
            continue;
        }

        let weight = 1.0 / longs.len() as f64;
        let weights: Vec<(String, f64)> = longs.iter().map(|t| (t.clone(), weight)).collect();
        let (start, end) = next_month_range(month);
        let daily = panel.portfolio_returns(&weights, start, end);

        tracing::info!(%month, tickers = longs.len(), days = daily.len(), "sentiment month");
        result.months.push(SentimentMonth {
            date: month,
            tickers: longs,
            days: daily.len(),
        });
        result.daily.extend(daily);
    }

    result.daily.sort_by_key(|(d, _)| *d);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::{PriceField, group_by_ticker};
    use crate::domain::price::PriceBar;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(date: NaiveDate, ticker: &str, likes: f64) -> SentimentRecord {
        SentimentRecord {
            date,
            ticker: ticker.into(),
            posts: Some(1.0),
            comments: None,
            likes: Some(likes),
            impressions: Some(0.0),
        }
    }

    fn bar(ticker: &str, date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: Some(close * 2.0),
            volume: 1.0,
        }
    }

    #[test]
    fn engagement_skips_missing_counts() {
        let r = record(d(2024, 1, 5), "A", 10.0);
        assert_eq!(r.engagement(), 11.0);
    }

    #[test]
    fn monthly_engagement_is_mean_per_month_end() {
        let recs = vec![
            record(d(2024, 1, 5), "A", 9.0),
            record(d(2024, 1, 20), "A", 19.0),
            record(d(2024, 2, 1), "A", 0.0),
        ];
        let monthly = monthly_engagement(&recs);
        assert_eq!(monthly[&d(2024, 1, 31)]["A"], 15.0);
        assert_eq!(monthly[&d(2024, 2, 29)]["A"], 1.0);
    }

    #[test]
    fn top_by_engagement_orders_and_truncates() {
        let month: BTreeMap<String, f64> = [("A".into(), 1.0), ("B".into(), 5.0), ("C".into(), 5.0)]
            .into_iter()
            .collect();
        assert_eq!(top_by_engagement(&month, 2), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn backtest_equal_weights_next_month_close_returns() {
        let panel = ReturnPanel::from_series(
            &group_by_ticker(vec![
                bar("A", d(2024, 1, 31), 100.0),
                bar("A", d(2024, 2, 1), 110.0),
                bar("B", d(2024, 1, 31), 100.0),
                bar("B", d(2024, 2, 1), 90.0),
                bar("B", d(2024, 2, 2), 99.0),
            ]),
            PriceField::Close,
        );
        let recs = vec![
            record(d(2024, 1, 10), "A", 5.0),
            record(d(2024, 1, 10), "B", 3.0),
            record(d(2024, 1, 10), "NOPX", 100.0),
        ];

        let result = run_sentiment_backtest(&recs, &panel, 20);
        assert_eq!(result.months.len(), 1);
        assert_eq!(result.months[0].tickers, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(result.daily.len(), 2);
        assert!(result.daily[0].1.abs() < 1e-12);
        assert!((result.daily[1].1 - 0.05).abs() < 1e-12);
    }

    #[test]
    fn months_without_priced_tickers_are_skipped() {
        let panel = ReturnPanel::default();
        let recs = vec![record(d(2024, 1, 10), "A", 5.0)];
        let result = run_sentiment_backtest(&recs, &panel, 20);
        assert!(result.daily.is_empty());
        assert!(result.months.is_empty());
    }
}
