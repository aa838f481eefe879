//! GARCH(1,1) with constant mean and normal innovations.
//!
//! \[
//!   r_t = \mu + \varepsilon_t,\quad
//!   \sigma_t^2 = \omega + \alpha\,\varepsilon_{t-1}^2 + \beta\,\sigma_{t-1}^2
//! \]
//!
//! Parameters are estimated by maximum likelihood with Nelder–Mead over an
//! unconstrained reparameterization that keeps `omega > 0`, `alpha, beta >= 0`
//! and `alpha + beta < 1`. The recursion starts from an exponentially weighted
//! backcast of the first squared residuals.

use argmin::core::{CostFunction, Executor};
use argmin::solver::neldermead::NelderMead;
use std::f64::consts::PI;

pub const MIN_OBSERVATIONS: usize = 10;

const BACKCAST_SPAN: usize = 75;
const BACKCAST_DECAY: f64 = 0.94;
const MAX_PERSISTENCE: f64 = 0.9999;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GarchError {
    #[error("need at least 10 returns, have {0}")]
    TooFewObservations(usize),

    #[error("returns have zero variance")]
    ZeroVariance,

    #[error("likelihood optimization failed: {0}")]
    Solver(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarchParams {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl GarchParams {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GarchFit {
    pub params: GarchParams,
    pub log_likelihood: f64,
    last_residual: f64,
    last_variance: f64,
}

impl GarchFit {
    /// Conditional variance `horizon` steps past the end of the sample.
    pub fn forecast_variance(&self, horizon: usize) -> f64 {
        let p = &self.params;
        let mut var = p.omega + p.alpha * self.last_residual.powi(2) + p.beta * self.last_variance;
        for _ in 1..horizon {
            var = p.omega + p.persistence() * var;
        }
        var
    }
}

fn backcast(residuals: &[f64]) -> f64 {
    let tau = residuals.len().min(BACKCAST_SPAN);
    let weights: Vec<f64> = (0..tau).map(|i| BACKCAST_DECAY.powi(i as i32)).collect();
    let total: f64 = weights.iter().sum();
    residuals[..tau]
        .iter()
        .zip(&weights)
        .map(|(e, w)| e * e * w)
        .sum::<f64>()
        / total
}

/// Conditional variances for every observation and the normal log-likelihood.
fn filter(returns: &[f64], params: &GarchParams) -> (Vec<f64>, f64) {
    let residuals: Vec<f64> = returns.iter().map(|r| r - params.mu).collect();
    let start = backcast(&residuals);

    let mut variances = Vec::with_capacity(returns.len());
    let mut prev_sq = start;
    let mut prev_var = start;
    let mut loglik = 0.0;
    for e in &residuals {
        let var = (params.omega + params.alpha * prev_sq + params.beta * prev_var).max(1e-12);
        loglik -= 0.5 * ((2.0 * PI).ln() + var.ln() + e * e / var);
        variances.push(var);
        prev_sq = e * e;
        prev_var = var;
    }
    (variances, loglik)
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// [mu, ln omega, logit persistence, logit alpha share] -> parameters.
fn decode(theta: &[f64]) -> GarchParams {
    let persistence = MAX_PERSISTENCE * logistic(theta[2]);
    let alpha = persistence * logistic(theta[3]);
    GarchParams {
        mu: theta[0],
        omega: theta[1].exp(),
        alpha,
        beta: persistence - alpha,
    }
}

fn encode(params: &GarchParams) -> Vec<f64> {
    let persistence = params.persistence();
    vec![
        params.mu,
        params.omega.ln(),
        logit(persistence / MAX_PERSISTENCE),
        logit(params.alpha / persistence),
    ]
}

struct NegLogLikelihood<'a> {
    returns: &'a [f64],
}

impl CostFunction for NegLogLikelihood<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let (_, loglik) = filter(self.returns, &decode(theta));
        Ok(if loglik.is_finite() { -loglik } else { 1e300 })
    }
}

pub fn fit_garch(returns: &[f64]) -> Result<GarchFit, GarchError> {
    let n = returns.len();
    if n < MIN_OBSERVATIONS {
        return Err(GarchError::TooFewObservations(n));
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64;
    if var <= 0.0 {
        return Err(GarchError::ZeroVariance);
    }

    let start = GarchParams {
        mu: mean,
        omega: 0.1 * var,
        alpha: 0.1,
        beta: 0.8,
    };
    let x0 = encode(&start);
    let steps = [0.1 * var.sqrt(), 0.5, 0.5, 0.5];
    let mut simplex = vec![x0.clone()];
    for (i, step) in steps.iter().enumerate() {
        let mut point = x0.clone();
        point[i] += step;
        simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-8)
        .map_err(|e| GarchError::Solver(e.to_string()))?;
    let res = Executor::new(NegLogLikelihood { returns }, solver)
        .configure(|state| state.max_iters(2000))
        .run()
        .map_err(|e| GarchError::Solver(e.to_string()))?;
    let best = res
        .state
        .best_param
        .ok_or_else(|| GarchError::Solver("no best parameter".into()))?;

    let params = decode(&best);
    let (variances, log_likelihood) = filter(returns, &params);
    let last_variance = variances.last().copied().unwrap_or(var);
    Ok(GarchFit {
        params,
        log_likelihood,
        last_residual: returns[n - 1] - params.mu,
        last_variance,
    })
}
