//! Rolling market betas from monthly excess returns.
//!
//! beta = cov(excess_ret, Mkt-RF) / var(Mkt-RF) over a trailing window of
//! months; a beta exists only when every month in the window has both a stock
//! return and a factor value.

use crate::domain::calendar::{month_end, month_key};
use crate::domain::features::FeatureRow;
use crate::domain::panel::TickerSeries;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DEFAULT_WINDOW: usize = 12;

/// Monthly factor observation in decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorRow {
    pub date: NaiveDate,
    pub mkt_rf: f64,
    pub smb: f64,
    pub hml: f64,
    pub rf: f64,
}

impl FactorRow {
    /// Factor files publish percentages.
    pub fn from_percent(date: NaiveDate, mkt_rf: f64, smb: f64, hml: f64, rf: f64) -> Self {
        Self {
            date,
            mkt_rf: mkt_rf / 100.0,
            smb: smb / 100.0,
            hml: hml / 100.0,
            rf: rf / 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetaRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub beta: f64,
}

pub type MonthlyReturns = BTreeMap<String, BTreeMap<NaiveDate, f64>>;

/// Month-end close per ticker, then percent change between consecutive months.
pub fn monthly_returns(series: &[TickerSeries]) -> MonthlyReturns {
    series
        .iter()
        .map(|s| {
            let mut closes: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for bar in &s.bars {
                closes.insert(month_end(bar.date), bar.close);
            }
            let rets = closes
                .iter()
                .zip(closes.iter().skip(1))
                .filter(|((_, prev), _)| **prev != 0.0)
                .map(|((_, prev), (date, curr))| (*date, curr / prev - 1.0))
                .collect();
            (s.ticker.clone(), rets)
        })
        .collect()
}

/// Equal-weighted cross-sectional mean return as the market factor, with a
/// zero risk-free rate. Used when no factor file is available.
pub fn market_proxy(returns: &MonthlyReturns) -> Vec<FactorRow> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for rets in returns.values() {
        for (date, r) in rets {
            let entry = sums.entry(*date).or_insert((0.0, 0));
            entry.0 += r;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(date, (sum, n))| FactorRow {
            date,
            mkt_rf: sum / n as f64,
            smb: 0.0,
            hml: 0.0,
            rf: 0.0,
        })
        .collect()
}

fn sample_cov(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    xs.iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / (n - 1.0)
}

/// Rolling betas for every ticker. Factors are matched to returns by calendar
/// month, so a factor dated on the first of a month lines up with month-end
/// returns.
pub fn rolling_betas(returns: &MonthlyReturns, factors: &[FactorRow], window: usize) -> Vec<BetaRow> {
    if window < 2 {
        return Vec::new();
    }

    let by_month: HashMap<(i32, u32), &FactorRow> =
        factors.iter().map(|f| (month_key(f.date), f)).collect();

    let months: Vec<NaiveDate> = returns
        .values()
        .flat_map(|r| r.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut out = Vec::new();
    for (ticker, rets) in returns {
        for end in window..=months.len() {
            let span = &months[end - window..end];
            let pairs: Option<(Vec<f64>, Vec<f64>)> = span
                .iter()
                .map(|m| {
                    let f = by_month.get(&month_key(*m))?;
                    let r = rets.get(m)?;
                    Some((r - f.rf, f.mkt_rf))
                })
                .collect::<Option<Vec<(f64, f64)>>>()
                .map(|v| v.into_iter().unzip());

            let Some((excess, market)) = pairs else {
                continue;
            };
            let var = sample_cov(&market, &market);
            if var <= 0.0 {
                continue;
            }
            out.push(BetaRow {
                date: span[window - 1],
                ticker: ticker.clone(),
                beta: sample_cov(&excess, &market) / var,
            });
        }
    }
    out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.ticker.cmp(&b.ticker)));
    out
}

/// Left-join betas onto feature rows by (date, ticker).
pub fn merge_betas(mut features: Vec<FeatureRow>, betas: &[BetaRow]) -> Vec<FeatureRow> {
    let lookup: HashMap<(NaiveDate, &str), f64> = betas
        .iter()
        .map(|b| ((b.date, b.ticker.as_str()), b.beta))
        .collect();
    for row in &mut features {
        row.beta = lookup.get(&(row.date, row.ticker.as_str())).copied();
    }
    features
}
