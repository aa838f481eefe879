//! Market data source port trait.

use crate::domain::error::QuantlabError;
use crate::domain::price::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Index constituents as listed by the source, before normalization.
    fn list_constituents(&self) -> Result<Vec<String>, QuantlabError>;

    fn fetch_daily(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, QuantlabError>;
}
