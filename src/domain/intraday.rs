//! Intraday momentum gated by forecast daily volatility.
//!
//! A rolling GARCH(1,1) on daily percent returns forecasts the next day's
//! volatility. On days where the forecast is above its median and the
//! session's open-to-close move is positive, the strategy earns that move.

use crate::domain::garch::fit_garch;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct IntradayConfig {
    pub window: usize,
    pub horizon: usize,
}

impl Default for IntradayConfig {
    fn default() -> Self {
        Self {
            window: 252,
            horizon: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntradayBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntradayRow {
    pub date: NaiveDate,
    pub pred_vol: f64,
    pub intraday_mom: f64,
    pub pos: u8,
    pub strategy_ret: f64,
}

/// Daily percent returns (scaled by 100), dated by the later close.
pub fn percent_returns(daily: &[DailyClose]) -> Vec<(NaiveDate, f64)> {
    let mut sorted = daily.to_vec();
    sorted.sort_by_key(|d| d.date);
    sorted
        .windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].date, (w[1].close / w[0].close - 1.0) * 100.0))
        .collect()
}

/// Forecast volatility for the day after each window end. Windows whose fit
/// fails are skipped with a warning.
pub fn predict_volatility(daily: &[DailyClose], config: &IntradayConfig) -> Vec<(NaiveDate, f64)> {
    let returns = percent_returns(daily);
    let values: Vec<f64> = returns.iter().map(|(_, r)| *r).collect();

    let mut out = Vec::new();
    for t in config.window..returns.len() {
        let date = returns[t].0;
        match fit_garch(&values[t + 1 - config.window..=t]) {
            Ok(fit) => {
                let vol = fit.forecast_variance(config.horizon.max(1)).sqrt();
                out.push((date + Duration::days(1), vol));
            }
            Err(e) => tracing::warn!(%date, error = %e, "GARCH fit failed"),
        }
    }
    out
}

/// Last close over first open, minus one, per session date.
pub fn intraday_momentum(bars: &[IntradayBar]) -> BTreeMap<NaiveDate, f64> {
    let mut sorted = bars.to_vec();
    sorted.sort_by_key(|b| b.timestamp);

    let mut sessions: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for bar in &sorted {
        sessions
            .entry(bar.timestamp.date())
            .and_modify(|(_, last_close)| *last_close = bar.close)
            .or_insert((bar.open, bar.close));
    }
    sessions
        .into_iter()
        .map(|(date, (first_open, last_close))| (date, last_close / first_open - 1.0))
        .collect()
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Inner join of forecasts and momentum by date, then the position rule.
pub fn combine_signals(pred_vol: &[(NaiveDate, f64)], momentum: &BTreeMap<NaiveDate, f64>) -> Vec<IntradayRow> {
    let joined: BTreeMap<NaiveDate, (f64, f64)> = pred_vol
        .iter()
        .filter(|(_, v)| v.is_finite())
        .filter_map(|(date, vol)| {
            let mom = momentum.get(date).filter(|m| m.is_finite())?;
            Some((*date, (*vol, *mom)))
        })
        .collect();

    let mut vols: Vec<f64> = joined.values().map(|(v, _)| *v).collect();
    let Some(median_vol) = median(&mut vols) else {
        return Vec::new();
    };

    joined
        .into_iter()
        .map(|(date, (pred_vol, intraday_mom))| {
            let pos = u8::from(intraday_mom > 0.0 && pred_vol > median_vol);
            IntradayRow {
                date,
                pred_vol,
                intraday_mom,
                pos,
                strategy_ret: f64::from(pos) * intraday_mom,
            }
        })
        .collect()
}

pub fn run_intraday_backtest(daily: &[DailyClose], bars: &[IntradayBar], config: &IntradayConfig) -> Vec<IntradayRow> {
    let pred_vol = predict_volatility(daily, config);
    let momentum = intraday_momentum(bars);
    tracing::info!(forecasts = pred_vol.len(), sessions = momentum.len(), "intraday signals");
    combine_signals(&pred_vol, &momentum)
}
