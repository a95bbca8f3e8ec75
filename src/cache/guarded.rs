use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::backend::{CacheError, FastCache};
use super::circuit_breaker::CircuitBreaker;
use super::ranges::RangeKey;
use crate::metrics::Metrics;
use crate::types::{Profile, Role, UserCount};

/// Upper bound on a single fast-cache call, connection setup included.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Fast cache behind a circuit breaker.
///
/// Every method degrades to a miss (`None`, empty, or a silent skip for writes)
/// when the backend is absent, the circuit is open, or the call fails or
/// outlives `op_timeout`. A timeout counts as a failure.
pub struct GuardedCache {
    backend: Option<Arc<dyn FastCache>>,
    breaker: CircuitBreaker,
    op_timeout: Duration,
    metrics: Option<Metrics>,
}

impl GuardedCache {
    pub fn new(backend: Arc<dyn FastCache>, breaker: CircuitBreaker) -> Self {
        Self {
            backend: Some(backend),
            breaker,
            op_timeout: DEFAULT_OP_TIMEOUT,
            metrics: None,
        }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            breaker: CircuitBreaker::default(),
            op_timeout: DEFAULT_OP_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Option<&Arc<dyn FastCache>> {
        let backend = self.backend.as_ref()?;
        if self.breaker.allow() {
            Some(backend)
        } else {
            None
        }
    }

    async fn call<T, F>(&self, op: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable(format!(
                "{} timed out after {}ms",
                op,
                self.op_timeout.as_millis()
            ))),
        };
        self.settle(op, result)
    }

    fn settle<T>(&self, op: &str, result: Result<T, CacheError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.breaker.record_success();
                Some(value)
            }
            // The backend answered; the value itself is unreadable.
            Err(CacheError::Serialization(e)) => {
                log::debug!("⚠️  Fast cache {} returned unreadable data: {}", op, e);
                None
            }
            Err(e) => {
                log::warn!("⚠️  Fast cache {} failed: {}", op, e);
                self.breaker.record_failure();
                if let Some(metrics) = &self.metrics {
                    metrics.inc_cache_failure();
                }
                None
            }
        }
    }

    pub async fn get_profile(&self, user_id: &str) -> Option<Profile> {
        let backend = self.backend()?;
        self.call("get_profile", backend.get_profile(user_id))
            .await
            .flatten()
    }

    pub async fn get_profiles(&self, user_ids: &[String]) -> HashMap<String, Profile> {
        let Some(backend) = self.backend() else {
            return HashMap::new();
        };
        self.call("get_profiles", backend.get_profiles(user_ids))
            .await
            .unwrap_or_default()
    }

    pub async fn put_profiles(&self, profiles: &[Profile], ttl: Duration) {
        if profiles.is_empty() {
            return;
        }
        if let Some(backend) = self.backend() {
            self.call("put_profiles", backend.put_profiles(profiles, ttl))
                .await;
        }
    }

    pub async fn increment(&self, role: Role, ranges: &[RangeKey], user_id: &str, by: i64) {
        if let Some(backend) = self.backend() {
            self.call("increment", backend.increment(role, ranges, user_id, by))
                .await;
        }
    }

    /// `None` on miss, including an empty leaderboard.
    pub async fn top(&self, role: Role, range: RangeKey, limit: usize) -> Option<Vec<UserCount>> {
        let backend = self.backend()?;
        self.call("top", backend.top(role, range, limit))
            .await
            .filter(|rows| !rows.is_empty())
    }

    /// Returns `false` when the replacement did not happen.
    pub async fn replace_leaderboard(
        &self,
        range: RangeKey,
        givers: &[UserCount],
        recipients: &[UserCount],
    ) -> bool {
        match self.backend() {
            Some(backend) => self
                .call(
                    "replace_leaderboard",
                    backend.replace_leaderboard(range, givers, recipients),
                )
                .await
                .is_some(),
            None => false,
        }
    }

    pub async fn ping(&self) -> bool {
        match self.backend() {
            Some(backend) => self.call("ping", backend.ping()).await.is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, RedisCache};
    use async_trait::async_trait;
    use tokio::net::TcpListener;

    /// Answers every read with a value that does not decode.
    struct CorruptCache;

    fn unreadable() -> CacheError {
        CacheError::Serialization(serde_json::from_str::<Profile>("{").unwrap_err())
    }

    #[async_trait]
    impl FastCache for CorruptCache {
        async fn get_profile(&self, _user_id: &str) -> Result<Option<Profile>, CacheError> {
            Err(unreadable())
        }
        async fn get_profiles(&self, _ids: &[String]) -> Result<HashMap<String, Profile>, CacheError> {
            Err(unreadable())
        }
        async fn put_profiles(&self, _p: &[Profile], _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }
        async fn increment(&self, _r: Role, _k: &[RangeKey], _u: &str, _by: i64) -> Result<(), CacheError> {
            Ok(())
        }
        async fn top(&self, _r: Role, _k: RangeKey, _l: usize) -> Result<Vec<UserCount>, CacheError> {
            Ok(Vec::new())
        }
        async fn replace_leaderboard(
            &self,
            _k: RangeKey,
            _g: &[UserCount],
            _r: &[UserCount],
        ) -> Result<(), CacheError> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_backend() {
        let memory = Arc::new(MemoryCache::new());
        let guarded = GuardedCache::new(
            memory.clone(),
            CircuitBreaker::new(3, Duration::from_secs(600)),
        );

        memory.set_failing(true);
        for _ in 0..3 {
            assert!(guarded.get_profile("U1").await.is_none());
        }
        assert_eq!(memory.calls(), 3);

        // Open: nothing reaches the backend, every read is a miss.
        memory.set_failing(false);
        assert!(guarded.get_profile("U1").await.is_none());
        guarded.increment(Role::Givers, &[RangeKey::AllTime], "U1", 1).await;
        assert!(guarded.top(Role::Givers, RangeKey::AllTime, 5).await.is_none());
        assert_eq!(memory.calls(), 3);

        tokio::time::advance(Duration::from_secs(600)).await;
        guarded.increment(Role::Givers, &[RangeKey::AllTime], "U1", 1).await;
        assert_eq!(memory.calls(), 4);
        assert_eq!(
            guarded.top(Role::Givers, RangeKey::AllTime, 5).await,
            Some(vec![UserCount { user_id: "U1".to_string(), count: 1 }])
        );
    }

    #[tokio::test]
    async fn test_disabled_always_misses() {
        let guarded = GuardedCache::disabled();
        assert!(guarded.get_profile("U1").await.is_none());
        assert!(guarded.get_profiles(&["U1".to_string()]).await.is_empty());
        assert!(!guarded.ping().await);
    }

    #[tokio::test]
    async fn test_unreadable_value_is_a_miss() {
        let metrics = Metrics::new("C1");
        let guarded = GuardedCache::new(
            Arc::new(CorruptCache),
            CircuitBreaker::new(3, Duration::from_secs(600)),
        )
        .with_metrics(metrics.clone());

        for _ in 0..5 {
            assert!(guarded.get_profile("U1").await.is_none());
            assert!(guarded.get_profiles(&["U1".to_string()]).await.is_empty());
        }
        assert!(guarded.breaker.allow());
        assert_eq!(guarded.breaker.consecutive_failures(), 0);
        assert!(metrics
            .render_prometheus()
            .contains("beerbot_cache_failures_total 0"));
    }

    #[tokio::test]
    async fn test_silent_redis_opens_circuit() {
        // Accepts connections and never writes a byte back.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let metrics = Metrics::new("C1");
        let redis = RedisCache::new(&format!("redis://{}", addr)).unwrap();
        let guarded = GuardedCache::new(
            Arc::new(redis),
            CircuitBreaker::new(3, Duration::from_secs(600)),
        )
        .with_timeout(Duration::from_millis(200))
        .with_metrics(metrics.clone());

        let started = std::time::Instant::now();
        for _ in 0..3 {
            guarded.increment(Role::Givers, &[RangeKey::AllTime], "U1", 1).await;
        }
        assert!(guarded.top(Role::Givers, RangeKey::AllTime, 5).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(3));

        assert!(!guarded.breaker.allow());
        assert!(metrics
            .render_prometheus()
            .contains("beerbot_cache_failures_total 3"));
        server.abort();
    }
}
