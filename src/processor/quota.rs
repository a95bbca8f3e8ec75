#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// Nothing left for today.
    LimitReached,
    /// The request is larger than what is left; `remaining` is what is left.
    WouldExceed { remaining: i64 },
}

/// All-or-nothing daily quota check.
pub fn check_quota(given_today: i64, requested: i64, max_per_day: i64) -> QuotaDecision {
    if given_today >= max_per_day {
        return QuotaDecision::LimitReached;
    }
    let remaining = max_per_day - given_today;
    if requested > remaining {
        QuotaDecision::WouldExceed { remaining }
    } else {
        QuotaDecision::Allowed
    }
}
