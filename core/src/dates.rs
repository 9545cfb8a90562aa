//! Calendar helpers anchored to the user's timezone.
//!
//! Everything here is a pure function of its inputs; callers obtain "today"
//! once via [`today_in`] and pass it down.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "Europe/Sofia";

/// Current calendar date in `tz`.
#[must_use]
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// `(today - days, today)`, both inclusive.
#[must_use]
pub fn lookback(today: NaiveDate, days: u32) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(i64::from(days)), today)
}

/// Monday and Sunday of the week containing `date`.
#[must_use]
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = i64::from(date.weekday().num_days_from_monday());
    let monday = date - Duration::days(offset);
    (monday, monday + Duration::days(6))
}

/// The week before the one starting on `monday`.
#[must_use]
pub fn previous_week(monday: NaiveDate) -> (NaiveDate, NaiveDate) {
    let prev_monday = monday - Duration::days(7);
    (prev_monday, prev_monday + Duration::days(6))
}

#[must_use]
pub fn iso_week(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// Every date from `start` to `end` inclusive. Empty when `start > end`.
#[must_use]
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Best-effort parse of the date shapes that show up in exports.
///
/// Tries ISO first, then ISO timestamps, then US and European slash formats.
/// An ambiguous value like `03/04/2026` resolves as month/day.
#[must_use]
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Timestamps with an offset, e.g. "2026-02-09T07:31:00+02:00"
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Convert an Excel serial day number (1900 date system) to a date.
///
/// Only serials between 1954 and 2119 are accepted so that stray numeric
/// cells never pass as dates.
#[must_use]
pub fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !(20_000.0..=80_000.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Invalid timezone '{name}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_lookback_is_inclusive() {
        let (start, end) = lookback(d("2026-02-09"), 7);
        assert_eq!(start, d("2026-02-02"));
        assert_eq!(end, d("2026-02-09"));
        assert_eq!(date_range(start, end).len(), 8);
    }

    #[test]
    fn test_week_bounds_midweek() {
        // 2026-02-11 is a Wednesday
        let (mon, sun) = week_bounds(d("2026-02-11"));
        assert_eq!(mon, d("2026-02-09"));
        assert_eq!(sun, d("2026-02-15"));
    }

    #[test]
    fn test_week_bounds_on_sunday_and_monday() {
        assert_eq!(week_bounds(d("2026-02-15")).0, d("2026-02-09"));
        assert_eq!(week_bounds(d("2026-02-09")).0, d("2026-02-09"));
    }

    #[test]
    fn test_previous_week() {
        let (mon, sun) = previous_week(d("2026-02-09"));
        assert_eq!(mon, d("2026-02-02"));
        assert_eq!(sun, d("2026-02-08"));
    }

    #[test]
    fn test_iso_week_year_boundary() {
        assert_eq!(iso_week(d("2026-02-09")), 7);
        // 2027-01-01 is a Friday, still ISO week 53 of 2026
        assert_eq!(iso_week(d("2027-01-01")), 53);
    }

    #[test]
    fn test_date_range_empty_when_reversed() {
        assert!(date_range(d("2026-02-10"), d("2026-02-09")).is_empty());
        assert_eq!(date_range(d("2026-02-09"), d("2026-02-09")), vec![d("2026-02-09")]);
    }

    #[test]
    fn test_parse_iso_date_rejects_garbage() {
        assert!(parse_iso_date("2026-02-30").is_err());
        assert!(parse_iso_date("09/02/2026").is_err());
        assert_eq!(parse_iso_date(" 2026-02-09 ").unwrap(), d("2026-02-09"));
    }

    #[test]
    fn test_normalize_date_formats() {
        let want = Some(d("2026-02-09"));
        assert_eq!(normalize_date("2026-02-09"), want);
        assert_eq!(normalize_date("2026-02-09T00:00:00"), want);
        assert_eq!(normalize_date("2026-02-09 00:00:00"), want);
        assert_eq!(normalize_date("02/09/2026"), want);
        assert_eq!(normalize_date("2026/02/09"), want);
        // day > 12 can only be day/month
        assert_eq!(normalize_date("13/02/2026"), Some(d("2026-02-13")));
        assert_eq!(normalize_date("2026-02-09T07:31:00+02:00"), want);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("yesterday-ish"), None);
    }

    #[test]
    fn test_excel_serial_date() {
        assert_eq!(excel_serial_date(46062.0), Some(d("2026-02-09")));
        // time of day is dropped
        assert_eq!(excel_serial_date(46062.75), Some(d("2026-02-09")));
        assert_eq!(excel_serial_date(2100.0), None);
        assert_eq!(excel_serial_date(f64::NAN), None);
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone(DEFAULT_TIMEZONE).unwrap(), chrono_tz::Europe::Sofia);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
