//! Mean-variance inputs and the long-only max-Sharpe optimizer.
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\ge 0,\ \sum w = 1} \frac{\mathbf{w}^\top\mu-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! $$
//!
//! Weights are parameterized through a softmax so Nelder–Mead searches an
//! unconstrained space while staying on the simplex.

use argmin::core::{CostFunction, Executor};
use argmin::solver::neldermead::NelderMead;

#[derive(Debug, Clone, thiserror::Error)]
pub enum OptimizeError {
    #[error("no assets to optimize")]
    NoAssets,

    #[error("need at least two price rows, have {rows}")]
    InsufficientHistory { rows: usize },

    #[error("no asset has an expected return above the risk-free rate {risk_free}")]
    NoReturnAboveRiskFree { risk_free: f64 },

    #[error("solver failed: {reason}")]
    Solver { reason: String },
}

fn daily_returns(prices: &[Vec<f64>]) -> Vec<Vec<f64>> {
    prices
        .windows(2)
        .map(|w| w[1].iter().zip(&w[0]).map(|(c, p)| c / p - 1.0).collect())
        .collect()
}

/// Compounded annualized mean historical return per column:
/// prod(1 + r)^(frequency / n) - 1.
pub fn mean_historical_return(prices: &[Vec<f64>], frequency: f64) -> Result<Vec<f64>, OptimizeError> {
    if prices.len() < 2 {
        return Err(OptimizeError::InsufficientHistory { rows: prices.len() });
    }
    let rets = daily_returns(prices);
    let n = rets.len() as f64;
    let cols = prices[0].len();
    Ok((0..cols)
        .map(|c| {
            let growth: f64 = rets.iter().map(|r| 1.0 + r[c]).product();
            growth.powf(frequency / n) - 1.0
        })
        .collect())
}

/// Annualized sample covariance of daily returns.
pub fn sample_covariance(prices: &[Vec<f64>], frequency: f64) -> Result<Vec<Vec<f64>>, OptimizeError> {
    let rets = daily_returns(prices);
    if rets.len() < 2 {
        return Err(OptimizeError::InsufficientHistory { rows: prices.len() });
    }
    let n = rets.len() as f64;
    let cols = rets[0].len();
    let means: Vec<f64> = (0..cols)
        .map(|c| rets.iter().map(|r| r[c]).sum::<f64>() / n)
        .collect();

    let mut cov = vec![vec![0.0; cols]; cols];
    for i in 0..cols {
        for j in i..cols {
            let s: f64 = rets
                .iter()
                .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
                .sum::<f64>()
                / (n - 1.0)
                * frequency;
            cov[i][j] = s;
            cov[j][i] = s;
        }
    }
    Ok(cov)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn quad_form(w: &[f64], cov: &[Vec<f64>]) -> f64 {
    cov.iter().zip(w).map(|(row, wi)| wi * dot(row, w)).sum()
}

fn softmax(x: &[f64]) -> Vec<f64> {
    let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum < 1e-15 {
        vec![1.0 / x.len() as f64; x.len()]
    } else {
        exps.iter().map(|&e| e / sum).collect()
    }
}

pub fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// (expected return, volatility, Sharpe) of a weight vector.
pub fn portfolio_performance(w: &[f64], mu: &[f64], cov: &[Vec<f64>], risk_free: f64) -> (f64, f64, f64) {
    let ret = dot(w, mu);
    let vol = quad_form(w, cov).max(0.0).sqrt();
    let sharpe = if vol > 1e-15 { (ret - risk_free) / vol } else { 0.0 };
    (ret, vol, sharpe)
}

struct NegativeSharpe {
    mu: Vec<f64>,
    cov: Vec<Vec<f64>>,
    risk_free: f64,
}

impl CostFunction for NegativeSharpe {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let w = softmax(x);
        let (_, vol, _) = portfolio_performance(&w, &self.mu, &self.cov, self.risk_free);
        if vol < 1e-12 {
            return Ok(1e10);
        }
        Ok(-(dot(&w, &self.mu) - self.risk_free) / vol)
    }
}

/// Long-only, fully invested tangency portfolio.
pub fn max_sharpe(mu: &[f64], cov: &[Vec<f64>], risk_free: f64) -> Result<Vec<f64>, OptimizeError> {
    let n = mu.len();
    if n == 0 {
        return Err(OptimizeError::NoAssets);
    }
    if !mu.iter().any(|&m| m > risk_free) {
        return Err(OptimizeError::NoReturnAboveRiskFree { risk_free });
    }
    if n == 1 {
        return Ok(vec![1.0]);
    }

    let x0 = vec![0.0; n];
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
        let mut point = x0.clone();
        point[i] = 1.0;
        simplex.push(point);
    }

    let cost = NegativeSharpe {
        mu: mu.to_vec(),
        cov: cov.to_vec(),
        risk_free,
    };
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-10)
        .map_err(|e| OptimizeError::Solver {
            reason: e.to_string(),
        })?;
    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(5000))
        .run()
        .map_err(|e| OptimizeError::Solver {
            reason: e.to_string(),
        })?;

    let best = res.state.best_param.ok_or_else(|| OptimizeError::Solver {
        reason: "no best parameter".into(),
    })?;
    let w = softmax(&best);
    if w.iter().any(|v| !v.is_finite()) {
        return Err(OptimizeError::Solver {
            reason: "non-finite weights".into(),
        });
    }
    Ok(w)
}
