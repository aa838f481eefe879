//! Month-end arithmetic shared by the monthly stages.

use chrono::{Datelike, Duration, NaiveDate};

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    first_of_month(y, m) - Duration::days(1)
}

/// Inclusive date range covering the calendar month after `date`.
pub fn next_month_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_end(date) + Duration::days(1);
    (start, month_end(start))
}

/// (year, month) key used to align series sampled on different days of a month.
pub fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}
