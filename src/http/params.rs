//! Query-string helpers shared by the handlers

use chrono::NaiveDate;
use std::collections::HashMap;

use super::HttpError;
use crate::types::DateRange;

pub type QueryMap = HashMap<String, String>;

pub const MAX_LIMIT: usize = 100;

/// Non-empty value of `name`, if present.
pub fn get<'a>(query: &'a QueryMap, name: &str) -> Option<&'a str> {
    query.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

pub fn required<'a>(query: &'a QueryMap, name: &str) -> Result<&'a str, HttpError> {
    get(query, name).ok_or_else(|| HttpError::BadRequest(format!("{} required", name)))
}

/// `day=YYYY-MM-DD`, or `start=` and `end=` with start not after end.
pub fn date_range(query: &QueryMap) -> Result<DateRange, HttpError> {
    if let Some(day) = get(query, "day") {
        let day = parse_day(day)?;
        return Ok(DateRange::single_day(day));
    }
    match (get(query, "start"), get(query, "end")) {
        (Some(start), Some(end)) => {
            let (start, end) = match (parse_day(start), parse_day(end)) {
                (Ok(s), Ok(e)) => (s, e),
                _ => return Err(invalid_range("invalid start or end date")),
            };
            if start > end {
                return Err(invalid_range("start date must not be after end date"));
            }
            Ok(DateRange::new(start, end))
        }
        _ => Err(invalid_range(
            "must provide either day=YYYY-MM-DD or start=YYYY-MM-DD&end=YYYY-MM-DD",
        )),
    }
}

/// `limit` within `1..=MAX_LIMIT`; anything else yields `default`.
pub fn limit(query: &QueryMap, default: usize) -> usize {
    get(query, "limit")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| (1..=MAX_LIMIT).contains(v))
        .unwrap_or(default)
}

pub fn year(query: &QueryMap, name: &str, default: i32) -> i32 {
    get(query, name)
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(default)
}

/// Comma-separated ids, trimmed, blanks dropped.
pub fn id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_day(raw: &str) -> Result<NaiveDate, HttpError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| invalid_range(&e.to_string()))
}

fn invalid_range(detail: &str) -> HttpError {
    HttpError::BadRequest(format!("invalid or missing date range: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> QueryMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_forms() {
        assert_eq!(
            date_range(&query(&[("day", "2024-02-29")])).unwrap(),
            DateRange::single_day(day("2024-02-29"))
        );
        assert_eq!(
            date_range(&query(&[("start", "2024-01-01"), ("end", "2024-01-31")])).unwrap(),
            DateRange::new(day("2024-01-01"), day("2024-01-31"))
        );
        // day wins over start/end
        assert_eq!(
            date_range(&query(&[("day", "2024-03-01"), ("start", "2024-01-01"), ("end", "2024-01-31")]))
                .unwrap(),
            DateRange::single_day(day("2024-03-01"))
        );
    }

    #[test]
    fn test_date_range_rejections() {
        assert!(date_range(&query(&[])).is_err());
        assert!(date_range(&query(&[("start", "2024-01-01")])).is_err());
        assert!(date_range(&query(&[("day", "2024-13-01")])).is_err());
        assert!(date_range(&query(&[("start", "2024-02-01"), ("end", "2024-01-01")])).is_err());
    }

    #[test]
    fn test_limit_bounds() {
        assert_eq!(limit(&query(&[]), 20), 20);
        assert_eq!(limit(&query(&[("limit", "5")]), 20), 5);
        assert_eq!(limit(&query(&[("limit", "100")]), 20), 100);
        assert_eq!(limit(&query(&[("limit", "101")]), 20), 20);
        assert_eq!(limit(&query(&[("limit", "0")]), 30), 30);
        assert_eq!(limit(&query(&[("limit", "x")]), 30), 30);
    }

    #[test]
    fn test_id_list() {
        assert_eq!(id_list(" U1, ,U2,,U1 "), vec!["U1", "U2", "U1"]);
        assert!(id_list(" , ").is_empty());
    }
}
