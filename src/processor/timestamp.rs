use chrono::{DateTime, Utc};

/// Parse a platform-native `"<secs>.<fraction>"` timestamp. The fraction is
/// padded or truncated to nanoseconds.
pub fn parse_native_ts(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match raw.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (raw, ""),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;

    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos: u32 = digits.parse().ok()?;

    DateTime::from_timestamp(secs, nanos)
}

/// Event time for ledger writes and quota days; falls back to `now`.
pub fn event_time(raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_native_ts(raw).unwrap_or_else(|| {
        log::debug!("Unparseable message ts '{}', using current time", raw);
        now
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_with_fraction() {
        let at = parse_native_ts("1700000000.000100").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.nanosecond(), 100_000);

        let at = parse_native_ts("1700000000.1234567891234").unwrap();
        assert_eq!(at.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_parse_without_fraction() {
        assert_eq!(
            parse_native_ts("1700000000"),
            Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
        );
    }

    #[test]
    fn test_invalid_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for raw in ["", "abc", "12.3x", "-5.1", ".5"] {
            assert_eq!(event_time(raw, now), now, "input {:?}", raw);
        }
    }
}
