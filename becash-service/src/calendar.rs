//! Month arithmetic for statements and recurring entries.
//!
//! Statements are keyed by a reference month (`YYYY-MM`). Configured days-of-month (card
//! closing/due days, the day a recurring entry repeats on) are clamped to the last valid day
//! of the target month, so day 31 lands on Feb 28/29, Apr 30 and so on.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceMonth {
    year: i32,
    month: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid reference month '{0}', expected YYYY-MM")]
pub struct InvalidMonth(pub String);

impl ReferenceMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Current month in UTC.
    pub fn current() -> Self {
        Self::of(Utc::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // Construction guarantees a valid year/month.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or_else(|| self.first_day())
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::of(date) == *self
    }

    /// The date in this month whose day is `min(day, days_in_month)`.
    ///
    /// Day 0 is treated as day 1.
    pub fn clamp_day(&self, day: u32) -> NaiveDate {
        let day = day.clamp(1, self.days_in_month());
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or_else(|| self.last_day())
    }
}

impl fmt::Display for ReferenceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReferenceMonth {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for ReferenceMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReferenceMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(s: &str) -> ReferenceMonth {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_formats() {
        let m = month("2026-03");
        assert_eq!(m.year(), 2026);
        assert_eq!(m.month(), 3);
        assert_eq!(m.to_string(), "2026-03");
    }

    #[test]
    fn rejects_malformed_months() {
        for raw in ["2026-13", "2026-00", "2026-3", "26-03", "2026/03", "", "abcd-ef"] {
            assert!(raw.parse::<ReferenceMonth>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn next_and_previous_cross_year_boundaries() {
        assert_eq!(month("2025-12").next(), month("2026-01"));
        assert_eq!(month("2026-01").previous(), month("2025-12"));
        assert_eq!(month("2026-06").next().previous(), month("2026-06"));
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(month("2024-02").days_in_month(), 29);
        assert_eq!(month("2025-02").days_in_month(), 28);
        assert_eq!(month("1900-02").days_in_month(), 28);
        assert_eq!(month("2000-02").days_in_month(), 29);
        assert_eq!(month("2026-04").days_in_month(), 30);
        assert_eq!(month("2026-12").days_in_month(), 31);
    }

    #[test]
    fn clamped_day_is_min_of_configured_day_and_month_length() {
        let months = [
            "2024-01", "2024-02", "2025-02", "2026-04", "2026-06", "2026-09", "2026-11",
            "2026-12",
        ];
        for raw in months {
            let m = month(raw);
            for day in 1..=31u32 {
                let date = m.clamp_day(day);
                assert_eq!(date.day(), day.min(m.days_in_month()), "{raw} day {day}");
                assert!(m.contains(date));
            }
        }
    }

    #[test]
    fn clamp_day_treats_zero_as_first() {
        assert_eq!(
            month("2026-05").clamp_day(0),
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
        );
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&month("2026-07")).unwrap();
        assert_eq!(json, "\"2026-07\"");
        let back: ReferenceMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month("2026-07"));
        assert!(serde_json::from_str::<ReferenceMonth>("\"2026-7\"").is_err());
    }
}
