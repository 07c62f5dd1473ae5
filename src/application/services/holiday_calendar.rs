//! Holiday Calendar service module
//!
//! Pure date classification over a small immutable holiday set: weekday
//! lookup, weekend/holiday tests, and the special-day test that drives
//! weekend balancing.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;

/// Service answering calendar questions for the roster range
///
/// A date is "special" when it is a Friday, a weekend day, a holiday, or the
/// day before a holiday. Special days share the weekend-balance envelope.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Creates a new HolidayCalendar over the given holiday set
    ///
    /// # Arguments
    ///
    /// * `holidays` - The dates to treat as holidays
    ///
    /// # Returns
    ///
    /// A new HolidayCalendar instance
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Returns the weekday index of a date
    ///
    /// # Arguments
    ///
    /// * `date` - The date to classify
    ///
    /// # Returns
    ///
    /// Index in 0..7, where 0 = Monday and 6 = Sunday
    pub fn weekday(&self, date: NaiveDate) -> u32 {
        date.weekday().num_days_from_monday()
    }

    /// Returns the calendar month of a date (1-12)
    pub fn month_of(&self, date: NaiveDate) -> u32 {
        date.month()
    }

    /// Checks whether a date falls on Saturday or Sunday
    ///
    /// # Arguments
    ///
    /// * `date` - The date to classify
    ///
    /// # Returns
    ///
    /// `true` for Saturday and Sunday, `false` otherwise
    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Checks whether a date is in the holiday set
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Checks whether the next day is a holiday
    pub fn is_pre_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&(date + Duration::days(1)))
    }

    /// Special-day test: Friday, weekend, holiday, or pre-holiday
    ///
    /// Special days share the weekend-balance envelope and carry the
    /// weekend scoring bonus.
    ///
    /// # Arguments
    ///
    /// * `date` - The date to classify
    ///
    /// # Returns
    ///
    /// `true` when the date counts toward weekend balancing
    pub fn is_special(&self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Fri
            || self.is_weekend(date)
            || self.is_holiday(date)
            || self.is_pre_holiday(date)
    }

    /// Counts special days in an inclusive date range
    ///
    /// # Arguments
    ///
    /// * `start` - First date of the range
    /// * `end` - Last date of the range
    ///
    /// # Returns
    ///
    /// Number of special days in [start, end]
    pub fn special_days_in(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        let mut count = 0;
        let mut date = start;
        while date <= end {
            if self.is_special(date) {
                count += 1;
            }
            date += Duration::days(1);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn test_weekday_index() {
        let cal = HolidayCalendar::default();
        // 2026-01-05 is a Monday
        assert_eq!(cal.weekday(date(1, 5)), 0);
        assert_eq!(cal.weekday(date(1, 11)), 6);
    }

    #[test]
    fn test_weekend_and_friday_are_special() {
        let cal = HolidayCalendar::default();
        assert!(!cal.is_weekend(date(1, 9))); // Friday
        assert!(cal.is_special(date(1, 9)));
        assert!(cal.is_weekend(date(1, 10))); // Saturday
        assert!(cal.is_special(date(1, 10)));
        assert!(!cal.is_special(date(1, 7))); // Wednesday
    }

    #[test]
    fn test_holiday_and_pre_holiday() {
        let cal = HolidayCalendar::new([date(1, 6)]);
        assert!(cal.is_holiday(date(1, 6)));
        assert!(cal.is_pre_holiday(date(1, 5)));
        assert!(cal.is_special(date(1, 5)));
        assert!(cal.is_special(date(1, 6)));
    }

    #[test]
    fn test_special_days_in_range() {
        let cal = HolidayCalendar::default();
        // 2026-01-05 (Mon) .. 2026-01-11 (Sun): Fri + Sat + Sun
        assert_eq!(cal.special_days_in(date(1, 5), date(1, 11)), 3);
    }
}
