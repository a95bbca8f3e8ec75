use std::time::Duration;

/// Reconnect delay schedule: `min(base * 2^failures, max)`.
///
/// Unlike a bounded retry helper there is no attempt limit; the connection
/// manager keeps retrying until it is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next handshake after `failures` consecutive failures.
    /// Zero failures means no wait.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        // 2^31 seconds is far past any sane cap; clamp the shift.
        let factor = 1u32 << failures.min(31);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        let backoff = ReconnectBackoff::default();
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(8), Duration::from_secs(256));
        assert_eq!(backoff.delay(9), Duration::from_secs(300));
        assert_eq!(backoff.delay(200), Duration::from_secs(300));
    }
}
