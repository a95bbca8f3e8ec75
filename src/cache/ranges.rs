//! Leaderboard range keys and their calendar bounds

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::str::FromStr;

use crate::types::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKey {
    AllTime,
    Today,
    Last7Days,
    CurrentMonth,
    LastMonth,
    CurrentQuarter,
    LastQuarter,
}

impl RangeKey {
    pub const ALL: [RangeKey; 7] = [
        RangeKey::AllTime,
        RangeKey::Today,
        RangeKey::Last7Days,
        RangeKey::CurrentMonth,
        RangeKey::LastMonth,
        RangeKey::CurrentQuarter,
        RangeKey::LastQuarter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeKey::AllTime => "all-time",
            RangeKey::Today => "today",
            RangeKey::Last7Days => "last-7-days",
            RangeKey::CurrentMonth => "current-month",
            RangeKey::LastMonth => "last-month",
            RangeKey::CurrentQuarter => "current-quarter",
            RangeKey::LastQuarter => "last-quarter",
        }
    }

    /// Calendar days covered by this range at `now`; `None` for all-time.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<DateRange> {
        let today = now.date_naive();
        let (year, month) = (today.year(), today.month());

        let range = match self {
            RangeKey::AllTime => return None,
            RangeKey::Today => DateRange::single_day(today),
            RangeKey::Last7Days => DateRange::new(today - Duration::days(6), today),
            RangeKey::CurrentMonth => month_range(year, month),
            RangeKey::LastMonth => {
                let (y, m) = shift_month(year, month, -1);
                month_range(y, m)
            }
            RangeKey::CurrentQuarter => quarter_range(year, quarter_of(month)),
            RangeKey::LastQuarter => {
                let (y, m) = shift_month(year, first_month_of_quarter(quarter_of(month)), -3);
                quarter_range(y, quarter_of(m))
            }
        };
        Some(range)
    }
}

impl std::fmt::Display for RangeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-time" => Ok(RangeKey::AllTime),
            "today" => Ok(RangeKey::Today),
            "last-7-days" | "current-week" => Ok(RangeKey::Last7Days),
            "current-month" => Ok(RangeKey::CurrentMonth),
            "last-month" => Ok(RangeKey::LastMonth),
            "current-quarter" => Ok(RangeKey::CurrentQuarter),
            "last-quarter" => Ok(RangeKey::LastQuarter),
            other => Err(format!("unknown range '{}'", other)),
        }
    }
}

/// Ranges an incremental update at `now` must touch.
///
/// The previous month and quarter still receive increments during the first
/// seven days of the following period so late arrivals are not lost before the
/// next rebuild.
pub fn active_ranges(now: DateTime<Utc>) -> Vec<RangeKey> {
    let mut ranges = vec![
        RangeKey::AllTime,
        RangeKey::Today,
        RangeKey::CurrentQuarter,
        RangeKey::CurrentMonth,
        RangeKey::Last7Days,
    ];
    let (month, day) = (now.month(), now.day());
    if month % 3 == 1 && day <= 7 {
        ranges.push(RangeKey::LastQuarter);
    }
    if day <= 7 {
        ranges.push(RangeKey::LastMonth);
    }
    ranges
}

fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

fn first_month_of_quarter(quarter: u32) -> u32 {
    (quarter - 1) * 3 + 1
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn first_day(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

fn month_range(year: i32, month: u32) -> DateRange {
    let (ny, nm) = shift_month(year, month, 1);
    DateRange::new(first_day(year, month), first_day(ny, nm) - Duration::days(1))
}

fn quarter_range(year: i32, quarter: u32) -> DateRange {
    let start_month = first_month_of_quarter(quarter);
    let (ny, nm) = shift_month(year, start_month, 3);
    DateRange::new(first_day(year, start_month), first_day(ny, nm) - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_active_ranges_mid_month() {
        let ranges = active_ranges(at(2024, 5, 20));
        assert_eq!(ranges.len(), 5);
        assert!(!ranges.contains(&RangeKey::LastMonth));
        assert!(!ranges.contains(&RangeKey::LastQuarter));
    }

    #[test]
    fn test_active_ranges_early_month() {
        let ranges = active_ranges(at(2024, 5, 7));
        assert!(ranges.contains(&RangeKey::LastMonth));
        assert!(!ranges.contains(&RangeKey::LastQuarter));

        let ranges = active_ranges(at(2024, 4, 3));
        assert!(ranges.contains(&RangeKey::LastMonth));
        assert!(ranges.contains(&RangeKey::LastQuarter));

        let ranges = active_ranges(at(2024, 4, 8));
        assert_eq!(ranges.len(), 5);
    }

    #[test]
    fn test_bounds_across_year_boundary() {
        let now = at(2024, 1, 3);
        assert_eq!(RangeKey::AllTime.bounds(now), None);
        assert_eq!(
            RangeKey::Last7Days.bounds(now),
            Some(DateRange::new(day(2023, 12, 28), day(2024, 1, 3)))
        );
        assert_eq!(
            RangeKey::LastMonth.bounds(now),
            Some(DateRange::new(day(2023, 12, 1), day(2023, 12, 31)))
        );
        assert_eq!(
            RangeKey::LastQuarter.bounds(now),
            Some(DateRange::new(day(2023, 10, 1), day(2023, 12, 31)))
        );
        assert_eq!(
            RangeKey::CurrentQuarter.bounds(now),
            Some(DateRange::new(day(2024, 1, 1), day(2024, 3, 31)))
        );
    }

    #[test]
    fn test_bounds_leap_february() {
        let now = at(2024, 2, 10);
        assert_eq!(
            RangeKey::CurrentMonth.bounds(now),
            Some(DateRange::new(day(2024, 2, 1), day(2024, 2, 29)))
        );
    }

    #[test]
    fn test_parse_keys() {
        for key in RangeKey::ALL {
            assert_eq!(key.as_str().parse::<RangeKey>().unwrap(), key);
        }
        assert_eq!("current-week".parse::<RangeKey>().unwrap(), RangeKey::Last7Days);
        assert!("yesterday".parse::<RangeKey>().is_err());
    }
}
