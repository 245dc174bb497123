//! Calendar helpers shared by the record store and the mirror codec.

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

/// Wire format for shift dates, everywhere: store, mirror rows, model output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}-\d{2}:\d{2}$").expect("slot regex is valid"));

/// Parse a `YYYY-MM-DD` date string.
///
/// Batch callers treat the error as a per-item failure: the item is
/// skipped, the batch continues.
pub fn parse_shift_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
    })
}

/// Check a time-slot string against the `HH:MM-HH:MM` shape.
///
/// Slots are free text (rest markers and annotations are legitimate), so
/// this is a data-quality signal for logging, not a rejection rule.
pub fn slot_format_is_valid(slot: &str) -> bool {
    SLOT_RE.is_match(slot)
}

/// Monday and Sunday of the week containing `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - chrono::Days::new(today.weekday().num_days_from_monday() as u64);
    let sunday = monday + chrono::Days::new(6);
    (monday, sunday)
}

/// English day name, as written into the mirror's "Day" column.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shift_date() {
        assert_eq!(
            parse_shift_date("2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(
            parse_shift_date(" 2024-03-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(matches!(
            parse_shift_date("01/03/2024"),
            Err(ValidationError::InvalidDate { .. })
        ));
        assert!(parse_shift_date("").is_err());
    }

    #[test]
    fn test_slot_format() {
        assert!(slot_format_is_valid("08:00-16:00"));
        assert!(slot_format_is_valid("22:00-06:00"));
        assert!(!slot_format_is_valid("8:00-16:00"));
        assert!(!slot_format_is_valid("08:00"));
        assert!(!slot_format_is_valid("riposo"));
    }

    #[test]
    fn test_week_bounds_mid_week() {
        // 2024-03-06 is a Wednesday.
        let wednesday = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let (monday, sunday) = week_bounds(wednesday);
        assert_eq!(monday, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(sunday, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_week_bounds_on_monday_and_sunday() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(week_bounds(monday).0, monday);

        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (start, end) = week_bounds(sunday);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(end, sunday);
    }

    #[test]
    fn test_weekday_name() {
        assert_eq!(
            weekday_name(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            "Friday"
        );
    }

    proptest::proptest! {
        // Any date falls inside its own week, the week starts on a Monday
        // and spans exactly seven days.
        #[test]
        fn prop_week_bounds_contain_date(days in 0i64..20_000) {
            let date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
                + chrono::Duration::days(days);
            let (monday, sunday) = week_bounds(date);
            proptest::prop_assert!(monday <= date && date <= sunday);
            proptest::prop_assert_eq!(monday.weekday(), Weekday::Mon);
            proptest::prop_assert_eq!(sunday - monday, chrono::Duration::days(6));
        }
    }
}
