//! Daily price bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: f64,
}

impl PriceBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Garman–Klass single-bar variance estimate:
    /// 0.5 * ln(H/L)^2 - (2 ln 2 - 1) * ln(C/O)^2
    pub fn garman_klass(&self) -> Option<f64> {
        if self.high <= 0.0 || self.low <= 0.0 || self.open <= 0.0 || self.close <= 0.0 {
            return None;
        }
        let log_hl = (self.high / self.low).ln();
        let log_co = (self.close / self.open).ln();
        let value = 0.5 * log_hl.powi(2) - (2.0 * 2f64.ln() - 1.0) * log_co.powi(2);
        value.is_finite().then_some(value)
    }

    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }

    /// Adjusted close when the source provided one, otherwise close.
    pub fn adjusted_or_close(&self) -> f64 {
        self.adj_close.unwrap_or(self.close)
    }
}
