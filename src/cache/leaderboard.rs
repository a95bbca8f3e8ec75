//! Leaderboard aggregates: incremental updates, reads with durable fallback,
//! and the periodic full rebuild.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ranges::{active_ranges, RangeKey};
use super::GuardedCache;
use crate::store::{SqliteStore, StoreError};
use crate::types::{Role, UserCount};

/// Entries per role and range kept in the fast cache by a rebuild.
pub const REBUILD_TOP_N: usize = 100;

pub struct Leaderboard {
    cache: Arc<GuardedCache>,
    store: SqliteStore,
}

impl Leaderboard {
    pub fn new(cache: Arc<GuardedCache>, store: SqliteStore) -> Self {
        Self { cache, store }
    }

    /// Best-effort increments for one committed message.
    pub async fn record_gifts(&self, giver_id: &str, recipients: &[(String, i64)], now: DateTime<Utc>) {
        let total: i64 = recipients.iter().map(|(_, count)| count).sum();
        if total == 0 {
            return;
        }
        let ranges = active_ranges(now);
        self.cache.increment(Role::Givers, &ranges, giver_id, total).await;
        for (recipient_id, count) in recipients {
            self.cache
                .increment(Role::Recipients, &ranges, recipient_id, *count)
                .await;
        }
    }

    /// Top `limit` users for a range: fast cache when it has data, otherwise
    /// the same aggregation straight from the ledger.
    pub async fn top(
        &self,
        role: Role,
        range: RangeKey,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserCount>, StoreError> {
        if let Some(rows) = self.cache.top(role, range, limit).await {
            return Ok(rows);
        }
        let bounds = range.bounds(now);
        self.store.top_users(role, bounds.as_ref(), limit)
    }

    /// Recompute every range from the ledger and replace it in the fast cache.
    /// Returns how many ranges were replaced.
    pub async fn rebuild_all(&self, now: DateTime<Utc>) -> usize {
        if !self.cache.is_enabled() {
            return 0;
        }
        let mut rebuilt = 0;
        for range in RangeKey::ALL {
            let bounds = range.bounds(now);
            let computed = self
                .store
                .top_users(Role::Givers, bounds.as_ref(), REBUILD_TOP_N)
                .and_then(|givers| {
                    self.store
                        .top_users(Role::Recipients, bounds.as_ref(), REBUILD_TOP_N)
                        .map(|recipients| (givers, recipients))
                });
            let (givers, recipients) = match computed {
                Ok(rows) => rows,
                Err(e) => {
                    log::error!("❌ Leaderboard rebuild query failed for {}: {}", range, e);
                    continue;
                }
            };
            if self.cache.replace_leaderboard(range, &givers, &recipients).await {
                rebuilt += 1;
            }
        }
        rebuilt
    }

    /// Rebuild once now, then every `period`, until cancelled.
    pub fn spawn_sync(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!("⏰ Starting leaderboard sync (interval: {}s)", period.as_secs());
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let rebuilt = self.rebuild_all(Utc::now()).await;
                if rebuilt > 0 {
                    log::debug!("✅ Rebuilt {} leaderboard ranges", rebuilt);
                } else if self.cache.is_enabled() {
                    log::warn!("⚠️  Leaderboard rebuild skipped (fast cache unavailable)");
                }
            }
            log::info!("⏰ Leaderboard sync stopped");
        })
    }
}
