//! Performance statistics of daily strategy return series.

use chrono::NaiveDate;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// A named daily return series.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReturns {
    pub name: String,
    pub returns: Vec<(NaiveDate, f64)>,
}

impl StrategyReturns {
    pub fn new(name: impl Into<String>, mut returns: Vec<(NaiveDate, f64)>) -> Self {
        returns.sort_by_key(|(d, _)| *d);
        Self {
            name: name.into(),
            returns,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.returns.iter().map(|(_, r)| *r).collect()
    }

    pub fn cumulative(&self) -> Vec<(NaiveDate, f64)> {
        self.returns
            .iter()
            .map(|(d, _)| *d)
            .zip(cumulative_returns(&self.values()))
            .collect()
    }
}

/// `(1 + r).cumprod() - 1`.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |wealth, r| {
            *wealth *= 1.0 + r;
            Some(*wealth - 1.0)
        })
        .collect()
}

/// Mean over sample standard deviation, annualized by `sqrt(periods_per_year)`.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        mean / stddev * periods_per_year.sqrt()
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub observations: usize,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
}

impl Metrics {
    pub fn compute(returns: &[f64], periods_per_year: f64) -> Self {
        let cumulative = cumulative_returns(returns);
        let total_return = cumulative.last().copied().unwrap_or(0.0);

        let years = returns.len() as f64 / periods_per_year;
        let annualized_return = if years > 0.0 && total_return > -1.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&cumulative);

        Metrics {
            observations: returns.len(),
            total_return,
            annualized_return,
            sharpe_ratio: sharpe_ratio(returns, periods_per_year),
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

/// Largest peak-to-trough fall of the wealth curve `1 + cumret` (starting at
/// 1) and the longest run of periods spent below a peak.
fn compute_drawdown(cumulative: &[f64]) -> (f64, usize) {
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for wealth in cumulative.iter().map(|c| 1.0 + c) {
        if wealth >= peak {
            peak = wealth;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - wealth) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}
