//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Warmup: slow - 1 + signal - 1 bars.

use crate::domain::indicator::ema::ema_values;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::price::PriceBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[PriceBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = ema_values(&closes, fast);
    let ema_slow = ema_values(&closes, slow);

    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // Signal EMA runs only over the defined part of the MACD line.
    let first_defined = macd_line.iter().position(Option::is_some);
    let mut signal_line = vec![None; bars.len()];
    if let Some(start) = first_defined {
        let defined: Vec<f64> = macd_line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, value) in ema_values(&defined, signal_period).into_iter().enumerate() {
            signal_line[start + offset] = value;
        }
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match (macd_line[i], signal_line[i]) {
            (Some(line), Some(signal)) => IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Macd {
                    line,
                    signal,
                    histogram: line - signal,
                },
            },
            _ => IndicatorPoint {
                date: bar.date,
                valid: false,
                value: IndicatorValue::Macd {
                    line: 0.0,
                    signal: 0.0,
                    histogram: 0.0,
                },
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_bars(prices: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                ticker: "TEST".into(),
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                adj_close: None,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn macd_warmup_default() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let series = calculate_macd(&make_bars(&prices), DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL);

        let warmup = DEFAULT_SLOW - 1 + DEFAULT_SIGNAL - 1;
        assert!(!series.values[warmup - 1].valid);
        assert!(series.values[warmup].valid);
    }

    #[test]
    fn macd_constant_prices_have_zero_histogram() {
        let series = calculate_macd(&make_bars(&[50.0; 40]), 3, 6, 3);
        for i in 0..40 {
            if let Some(h) = series.histogram_at(i) {
                assert!(h.abs() < 1e-12);
            }
        }
        assert!(series.histogram_at(39).is_some());
    }

    #[test]
    fn macd_small_periods_match_manual() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        let series = calculate_macd(&make_bars(&prices), 1, 2, 2);
        // fast = price; slow EMA(2): [_, 1.5, 2.5, 3.5, 4.5]; line: [_, .5, .5, .5, .5]
        // signal EMA(2) over line: [_, _, .5, .5, .5]
        assert!(series.histogram_at(1).is_none());
        assert!(series.histogram_at(2).unwrap().abs() < 1e-12);
    }

    #[test]
    fn macd_rising_trend_has_positive_line() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let series = calculate_macd(&make_bars(&prices), 12, 26, 9);
        match series.values[59].value {
            IndicatorValue::Macd { line, .. } => assert!(line > 0.0),
            _ => panic!("expected MACD value"),
        }
    }

    #[test]
    fn macd_empty_bars() {
        let series = calculate_macd(&[], 12, 26, 9);
        assert!(series.values.is_empty());
    }
}
