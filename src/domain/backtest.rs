//! Monthly cluster backtest.
//!
//! At each month end the tickers labelled with the target cluster are
//! weighted by a max-Sharpe fit on their price history up to that date, then
//! held through the following calendar month.

use crate::domain::calendar::next_month_range;
use crate::domain::features::FeatureRow;
use crate::domain::optimizer::{self, OptimizeError};
use crate::domain::panel::ReturnPanel;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub cluster_id: usize,
    pub risk_free_rate: f64,
    pub frequency: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            cluster_id: 0,
            risk_free_rate: 0.02,
            frequency: 252.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    MaxSharpe,
    EqualFallback,
}

/// Weights chosen at one rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub date: NaiveDate,
    pub weights: Vec<(String, f64)>,
    pub source: WeightSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBacktest {
    pub cluster_id: usize,
    pub daily: Vec<(NaiveDate, f64)>,
    pub allocations: Vec<Allocation>,
}

/// Tickers per month end carrying the given cluster label.
pub fn cluster_members(rows: &[FeatureRow], cluster_id: usize) -> BTreeMap<NaiveDate, Vec<String>> {
    let mut members: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.cluster == Some(cluster_id)) {
        members.entry(row.date).or_default().push(row.ticker.clone());
    }
    members
}

fn optimize(
    tickers: &[String],
    panel: &ReturnPanel,
    date: NaiveDate,
    config: &BacktestConfig,
) -> Result<Vec<f64>, OptimizeError> {
    let prices = panel.aligned_prices(tickers, date);
    let mu = optimizer::mean_historical_return(&prices, config.frequency)?;
    let cov = optimizer::sample_covariance(&prices, config.frequency)?;
    optimizer::max_sharpe(&mu, &cov, config.risk_free_rate)
}

/// Max-Sharpe weights for `tickers` trained on prices up to `date`, or equal
/// weights when the optimizer cannot produce them.
pub fn allocate(
    tickers: &[String],
    panel: &ReturnPanel,
    date: NaiveDate,
    config: &BacktestConfig,
) -> Allocation {
    let (weights, source) = match optimize(tickers, panel, date, config) {
        Ok(w) => (w, WeightSource::MaxSharpe),
        Err(e) => {
            tracing::warn!(%date, error = %e, "optimization failed, using equal weights");
            (optimizer::equal_weights(tickers.len()), WeightSource::EqualFallback)
        }
    };
    Allocation {
        date,
        weights: tickers.iter().cloned().zip(weights).collect(),
        source,
    }
}

pub fn run_cluster_backtest(rows: &[FeatureRow], panel: &ReturnPanel, config: &BacktestConfig) -> ClusterBacktest {
    let mut daily = Vec::new();
    let mut allocations = Vec::new();

    for (date, members) in cluster_members(rows, config.cluster_id) {
        let (tickers, unknown): (Vec<String>, Vec<String>) =
            members.into_iter().partition(|t| panel.has_ticker(t));
        if !unknown.is_empty() {
            tracing::warn!(%date, tickers = ?unknown, "no prices for clustered tickers");
        }
        if tickers.is_empty() {
            continue;
        }

        let allocation = allocate(&tickers, panel, date, config);
        let (start, end) = next_month_range(date);
        let month = panel.portfolio_returns(&allocation.weights, start, end);
        tracing::info!(%date, tickers = tickers.len(), days = month.len(), "backtested month");
        daily.extend(month);
        allocations.push(allocation);
    }

    daily.sort_by_key(|(d, _)| *d);
    ClusterBacktest {
        cluster_id: config.cluster_id,
        daily,
        allocations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::{PriceField, group_by_ticker};
    use crate::domain::price::PriceBar;
    use chrono::Duration;
    use tracing_test::traced_test;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(ticker: &str, date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: None,
            volume: 1.0,
        }
    }

    fn clustered(date: NaiveDate, ticker: &str, cluster: usize) -> FeatureRow {
        let mut row = FeatureRow::new(date, ticker);
        row.cluster = Some(cluster);
        row
    }

    /// Daily bars from 2024-01-01 through 2024-02-29 following `path`.
    fn series(ticker: &str, path: impl Fn(usize) -> f64) -> Vec<PriceBar> {
        (0..60)
            .map(|i| bar(ticker, d(2024, 1, 1) + Duration::days(i as i64), path(i)))
            .collect()
    }

    fn panel(bars: Vec<Vec<PriceBar>>) -> ReturnPanel {
        ReturnPanel::from_series(&group_by_ticker(bars.concat()), PriceField::AdjustedOrClose)
    }

    #[test]
    fn default_config() {
        let c = BacktestConfig::default();
        assert_eq!(c.cluster_id, 0);
        assert!((c.risk_free_rate - 0.02).abs() < f64::EPSILON);
        assert!((c.frequency - 252.0).abs() < f64::EPSILON);
    }

    #[test]
    #[traced_test]
    fn each_rebalance_is_logged() {
        let panel = panel(vec![
            series("A", |i| 100.0 - i as f64 * 0.5),
            series("B", |i| 50.0 - i as f64 * 0.2 + (i % 2) as f64 * 0.1),
        ]);
        let rows = vec![clustered(d(2024, 1, 31), "A", 0), clustered(d(2024, 1, 31), "B", 0)];
        run_cluster_backtest(&rows, &panel, &BacktestConfig::default());

        assert!(logs_contain("backtested month"));
        assert!(logs_contain("date=2024-01-31"));
        assert!(logs_contain("tickers=2"));
        assert!(logs_contain("days=29"));
    }

    #[test]
    fn cluster_members_filters_label() {
        let rows = vec![
            clustered(d(2024, 1, 31), "A", 0),
            clustered(d(2024, 1, 31), "B", 1),
            clustered(d(2024, 2, 29), "C", 0),
        ];
        let members = cluster_members(&rows, 0);
        assert_eq!(members[&d(2024, 1, 31)], vec!["A".to_string()]);
        assert_eq!(members[&d(2024, 2, 29)], vec!["C".to_string()]);
    }

    #[test]
    fn falling_prices_fall_back_to_equal_weights() {
        let panel = panel(vec![
            series("A", |i| 100.0 - i as f64 * 0.5),
            series("B", |i| 50.0 - i as f64 * 0.2 + (i % 2) as f64 * 0.1),
        ]);
        let rows = vec![clustered(d(2024, 1, 31), "A", 0), clustered(d(2024, 1, 31), "B", 0)];
        let result = run_cluster_backtest(&rows, &panel, &BacktestConfig::default());

        assert_eq!(result.allocations.len(), 1);
        assert_eq!(result.allocations[0].source, WeightSource::EqualFallback);
        assert_eq!(result.allocations[0].weights[0].1, 0.5);
        // February only
        assert_eq!(result.daily.len(), 29);
        assert_eq!(result.daily[0].0, d(2024, 2, 1));
        assert_eq!(result.daily.last().unwrap().0, d(2024, 2, 29));
    }

    #[test]
    fn rising_prices_use_optimizer() {
        let panel = panel(vec![
            series("A", |i| 100.0 * (1.0 + 0.002 * i as f64) + (i % 3) as f64 * 0.3),
            series("B", |i| 50.0 * (1.0 + 0.001 * i as f64) + (i % 2) as f64 * 0.2),
        ]);
        let rows = vec![clustered(d(2024, 1, 31), "A", 0), clustered(d(2024, 1, 31), "B", 0)];
        let result = run_cluster_backtest(&rows, &panel, &BacktestConfig::default());

        let alloc = &result.allocations[0];
        assert_eq!(alloc.source, WeightSource::MaxSharpe);
        let total: f64 = alloc.weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(alloc.weights.iter().all(|(_, w)| *w >= 0.0));
    }

    #[test]
    fn other_clusters_and_unknown_tickers_are_ignored() {
        let panel = panel(vec![series("A", |i| 100.0 + i as f64)]);
        let rows = vec![
            clustered(d(2024, 1, 31), "A", 1),
            clustered(d(2024, 1, 31), "ZZZ", 0),
        ];
        let result = run_cluster_backtest(&rows, &panel, &BacktestConfig::default());
        assert!(result.daily.is_empty());
        assert!(result.allocations.is_empty());
    }

    #[test]
    fn single_ticker_holds_its_own_returns() {
        let panel = panel(vec![series("A", |i| 100.0 + i as f64)]);
        let rows = vec![clustered(d(2024, 1, 31), "A", 0)];
        let result = run_cluster_backtest(&rows, &panel, &BacktestConfig::default());

        let first = result.daily[0];
        assert_eq!(first.0, d(2024, 2, 1));
        assert_eq!(Some(first.1), panel.return_on("A", d(2024, 2, 1)));
    }
}
