//! Calendar helpers and report periods

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// First day of the month containing `d`
pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Last day of the month containing `d`
pub fn month_end(d: NaiveDate) -> NaiveDate {
    shift_months(month_start(d), 1) - Duration::days(1)
}

/// First day of the month `n` months away from the month containing `d`
pub fn shift_months(d: NaiveDate, n: i32) -> NaiveDate {
    let total = d.year() * 12 + d.month0() as i32 + n;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).unwrap_or(d)
}

/// A reporting window, resolved against "today" when used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportPeriod {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    ThisYear,
    LastYear,
    /// The trailing `days` days including today
    LastDays { days: i64 },
    /// One specific day
    Day { date: NaiveDate },
}

impl ReportPeriod {
    /// Inclusive date range
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            Self::Today => (today, today),
            Self::Yesterday => {
                let y = today - Duration::days(1);
                (y, y)
            }
            Self::ThisWeek => {
                let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (start, today)
            }
            Self::LastWeek => {
                let this_week =
                    today - Duration::days(today.weekday().num_days_from_monday() as i64);
                (this_week - Duration::days(7), this_week - Duration::days(1))
            }
            Self::ThisMonth => (month_start(today), today),
            Self::LastMonth => {
                let start = shift_months(today, -1);
                (start, month_end(start))
            }
            Self::ThisQuarter => {
                let q_month0 = today.month0() / 3 * 3;
                let start = NaiveDate::from_ymd_opt(today.year(), q_month0 + 1, 1).unwrap_or(today);
                (start, today)
            }
            Self::ThisYear => {
                let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                (start, today)
            }
            Self::LastYear => {
                let start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).unwrap_or(today);
                let end = NaiveDate::from_ymd_opt(today.year() - 1, 12, 31).unwrap_or(today);
                (start, end)
            }
            Self::LastDays { days } => {
                let start = Duration::try_days(days.max(1) - 1)
                    .and_then(|d| today.checked_sub_signed(d))
                    .unwrap_or(NaiveDate::MIN);
                (start, today)
            }
            Self::Day { date } => (date, date),
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => write!(f, "today"),
            Self::Yesterday => write!(f, "yesterday"),
            Self::ThisWeek => write!(f, "this week"),
            Self::LastWeek => write!(f, "last week"),
            Self::ThisMonth => write!(f, "this month"),
            Self::LastMonth => write!(f, "last month"),
            Self::ThisQuarter => write!(f, "this quarter"),
            Self::ThisYear => write!(f, "this year"),
            Self::LastYear => write!(f, "last year"),
            Self::LastDays { days } => write!(f, "the last {} days", days),
            Self::Day { date } => write!(f, "{}", date.format("%-d %B %Y")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(month_start(d(2025, 3, 14)), d(2025, 3, 1));
        assert_eq!(month_end(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(shift_months(d(2025, 1, 20), -1), d(2024, 12, 1));
        assert_eq!(shift_months(d(2025, 11, 5), 3), d(2026, 2, 1));
    }

    #[test]
    fn test_period_ranges() {
        let today = d(2025, 3, 14); // Friday
        assert_eq!(ReportPeriod::Yesterday.range(today), (d(2025, 3, 13), d(2025, 3, 13)));
        assert_eq!(ReportPeriod::ThisWeek.range(today), (d(2025, 3, 10), today));
        assert_eq!(ReportPeriod::LastWeek.range(today), (d(2025, 3, 3), d(2025, 3, 9)));
        assert_eq!(ReportPeriod::LastMonth.range(today), (d(2025, 2, 1), d(2025, 2, 28)));
        assert_eq!(ReportPeriod::ThisQuarter.range(today), (d(2025, 1, 1), today));
        assert_eq!(
            ReportPeriod::LastDays { days: 7 }.range(today),
            (d(2025, 3, 8), today)
        );
    }

    #[test]
    fn test_huge_last_days_clamps_to_earliest_date() {
        let today = d(2025, 3, 14);
        assert_eq!(
            ReportPeriod::LastDays { days: 9_999_999_999 }.range(today),
            (NaiveDate::MIN, today)
        );
        assert_eq!(
            ReportPeriod::LastDays { days: i64::MAX }.range(today),
            (NaiveDate::MIN, today)
        );
    }
}
