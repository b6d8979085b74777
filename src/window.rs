//! Pure clock-gate functions over a maintenance [`Window`]. No I/O, no clock
//! reads of its own — callers always pass `now` explicitly so this stays
//! independently testable.

use chrono::{Datelike, DateTime, TimeZone, Utc};
use std::time::Duration;

use crate::config::Window;

pub fn is_window_open(window: &Window, now: DateTime<Utc>) -> bool {
    window.is_open(now)
}

/// Nearest future instant at which `is_window_open` becomes true.
///
/// Walks forward a day at a time via [`chrono::NaiveDate::succ_opt`], which
/// rolls over month and year boundaries on its own — no separate "end of
/// month" branch to get wrong.
pub fn next_window_open(window: &Window, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    if window.weekdays.contains(&now.weekday()) && now.time() < window.not_before {
        return Utc.from_utc_datetime(&today.and_time(window.not_before));
    }
    let mut day = today.succ_opt().expect("date arithmetic overflow");
    loop {
        if window.weekdays.contains(&day.weekday()) {
            return Utc.from_utc_datetime(&day.and_time(window.not_before));
        }
        day = day.succ_opt().expect("date arithmetic overflow");
    }
}

pub fn sleep_until_next_window(window: &Window, now: DateTime<Utc>) -> Duration {
    let next = next_window_open(window, now);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::HashSet;

    fn window(not_before: &str, not_after: &str, days: &[chrono::Weekday]) -> Window {
        Window {
            not_before: NaiveTime::parse_from_str(not_before, "%H:%M").unwrap(),
            not_after: NaiveTime::parse_from_str(not_after, "%H:%M").unwrap(),
            weekdays: days.iter().copied().collect::<HashSet<_>>(),
        }
    }

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn open_inside_window_on_allowed_day() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Tue]);
        assert!(is_window_open(&w, dt("2025-01-07T01:00:00Z")));
    }

    #[test]
    fn closed_outside_time_bounds() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Tue]);
        assert!(!is_window_open(&w, dt("2025-01-07T12:00:00Z")));
    }

    #[test]
    fn closed_on_disallowed_weekday() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Mon]);
        assert!(!is_window_open(&w, dt("2025-01-07T01:00:00Z")));
    }

    #[test]
    fn not_after_is_exclusive() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Tue]);
        assert!(!is_window_open(&w, dt("2025-01-07T06:00:00Z")));
    }

    #[test]
    fn next_window_same_day_when_before_open() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Tue]);
        let next = next_window_open(&w, dt("2025-01-06T23:00:00Z")); // Monday
        assert_eq!(next, dt("2025-01-07T00:00:00Z"));
    }

    #[test]
    fn next_window_rolls_to_tomorrow_when_inside_window() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Mon, chrono::Weekday::Tue]);
        let next = next_window_open(&w, dt("2025-01-06T01:00:00Z")); // Monday, already open
        assert_eq!(next, dt("2025-01-07T00:00:00Z"));
    }

    #[test]
    fn next_window_skips_disallowed_weekdays() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Fri]);
        let next = next_window_open(&w, dt("2025-01-07T12:00:00Z")); // Tuesday, past window
        assert_eq!(next, dt("2025-01-10T00:00:00Z")); // Friday
    }

    #[test]
    fn next_window_rolls_across_year_boundary() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Thu]); // Jan 1 2026 is a Thursday
        let next = next_window_open(&w, dt("2025-12-31T12:00:00Z")); // Wednesday, past window
        assert_eq!(next, dt("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn sleep_duration_is_never_negative() {
        let w = window("00:00", "06:00", &[chrono::Weekday::Tue]);
        let d = sleep_until_next_window(&w, dt("2025-01-07T05:59:59Z"));
        assert!(d <= Duration::from_secs(1));
    }
}
