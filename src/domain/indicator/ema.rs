//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the first SMA, then EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values are invalid.

/// EMA over an arbitrary series; `None` for warmup entries.
pub fn ema_values(xs: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; xs.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(xs.len());
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &x) in xs.iter().enumerate() {
        if i < period - 1 {
            sum += x;
            out.push(None);
        } else if i == period - 1 {
            sum += x;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema = x * k + ema * (1.0 - k);
            out.push(Some(ema));
        }
    }
    out
}
