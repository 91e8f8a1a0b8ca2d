//! Time utilities.
//!
//! Wall-clock timestamps for stamping inbound data, plus the monthly-expiry
//! calendar helper used by the symbol translator.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Last Thursday of the given month.
///
/// Monthly derivative contracts on the Indian exchanges expire on the last
/// Thursday of the month. This is a calendar heuristic: exchange holidays
/// and regulatory changes to the expiry weekday are not modelled.
///
/// Returns `None` for an invalid month.
pub fn last_thursday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next - Duration::days(1);
    let back = (last_day.weekday().num_days_from_monday() + 7
        - Weekday::Thu.num_days_from_monday())
        % 7;
    Some(last_day - Duration::days(back as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_thursday_known_months() {
        assert_eq!(last_thursday(2024, 12), NaiveDate::from_ymd_opt(2024, 12, 26));
        assert_eq!(last_thursday(2025, 1), NaiveDate::from_ymd_opt(2025, 1, 30));
        // Month ending on a Thursday.
        assert_eq!(last_thursday(2024, 2), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(last_thursday(2024, 13), None);
    }

    #[test]
    fn clocks_are_consistent() {
        let ms = now_ms();
        let us = now_us();
        assert!(us / 1000 >= ms);
    }
}
