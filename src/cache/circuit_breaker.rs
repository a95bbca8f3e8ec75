use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_THRESHOLD: u32 = 3;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Failure-triggered bypass for the fast cache.
///
/// `threshold` consecutive failures open the circuit for `cooldown`; opening
/// resets the counter. While open, callers skip the cache entirely. Once the
/// cooldown has passed the next call goes through again, and any success
/// resets the counter.
///
/// State lives under a plain mutex that is never held across an await.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// `true` when a fast-cache call may be attempted right now.
    pub fn allow(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.open_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                state.open_until = None;
                log::info!("🔌 Cache circuit cooldown elapsed, retrying fast cache");
                true
            }
            None => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold {
            state.consecutive_failures = 0;
            state.open_until = Some(Instant::now() + self.cooldown);
            log::warn!(
                "⚠️  Cache circuit opened after {} failures, bypassing for {}s",
                self.threshold,
                self.cooldown.as_secs()
            );
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self.state.lock() {
            Ok(state) => state.consecutive_failures,
            Err(poisoned) => poisoned.into_inner().consecutive_failures,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN)
    }
}
