use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::backend::{leaderboard_key, profile_key, CacheError, FastCache};
use super::ranges::RangeKey;
use crate::types::{Profile, Role, UserCount};

/// In-process fast cache for single-node deployments and tests.
///
/// `set_failing(true)` makes every call return an error, and `calls()` counts
/// how many calls actually reached the backend.
#[derive(Default)]
pub struct MemoryCache {
    profiles: Mutex<HashMap<String, (Profile, Instant)>>,
    boards: Mutex<HashMap<String, HashMap<String, i64>>>,
    failing: AtomicBool,
    calls: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache set to fail".to_string()));
        }
        Ok(())
    }

    fn live_profile(&self, user_id: &str) -> Option<Profile> {
        let mut profiles = lock(&self.profiles);
        let key = profile_key(user_id);
        match profiles.get(&key) {
            Some((profile, expires)) if Instant::now() < *expires => Some(profile.clone()),
            Some(_) => {
                profiles.remove(&key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, CacheError> {
        self.enter()?;
        Ok(self.live_profile(user_id))
    }

    async fn get_profiles(&self, user_ids: &[String]) -> Result<HashMap<String, Profile>, CacheError> {
        self.enter()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| self.live_profile(id).map(|p| (id.clone(), p)))
            .collect())
    }

    async fn put_profiles(&self, profiles: &[Profile], ttl: Duration) -> Result<(), CacheError> {
        self.enter()?;
        let expires = Instant::now() + ttl;
        let mut stored = lock(&self.profiles);
        for profile in profiles {
            stored.insert(profile_key(&profile.user_id), (profile.clone(), expires));
        }
        Ok(())
    }

    async fn increment(
        &self,
        role: Role,
        ranges: &[RangeKey],
        user_id: &str,
        by: i64,
    ) -> Result<(), CacheError> {
        self.enter()?;
        let mut boards = lock(&self.boards);
        for range in ranges {
            *boards
                .entry(leaderboard_key(role, *range))
                .or_default()
                .entry(user_id.to_string())
                .or_insert(0) += by;
        }
        Ok(())
    }

    async fn top(&self, role: Role, range: RangeKey, limit: usize) -> Result<Vec<UserCount>, CacheError> {
        self.enter()?;
        let boards = lock(&self.boards);
        let mut rows: Vec<UserCount> = boards
            .get(&leaderboard_key(role, range))
            .map(|board| {
                board
                    .iter()
                    .map(|(user_id, count)| UserCount {
                        user_id: user_id.clone(),
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user_id.cmp(&b.user_id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn replace_leaderboard(
        &self,
        range: RangeKey,
        givers: &[UserCount],
        recipients: &[UserCount],
    ) -> Result<(), CacheError> {
        self.enter()?;
        let mut boards = lock(&self.boards);
        for (role, rows) in [(Role::Givers, givers), (Role::Recipients, recipients)] {
            let board: HashMap<String, i64> = rows
                .iter()
                .map(|row| (row.user_id.clone(), row.count))
                .collect();
            boards.insert(leaderboard_key(role, range), board);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(id: &str) -> Profile {
        Profile {
            user_id: id.to_string(),
            display_name: format!("name-{}", id),
            avatar_url: String::new(),
            cached_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_profiles_expire() {
        let cache = MemoryCache::new();
        cache
            .put_profiles(&[profile("U1")], Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.get_profile("U1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_profile("U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_and_replace() {
        let cache = MemoryCache::new();
        let ranges = [RangeKey::AllTime, RangeKey::Today];
        cache.increment(Role::Givers, &ranges, "UA", 2).await.unwrap();
        cache.increment(Role::Givers, &ranges, "UB", 5).await.unwrap();
        cache.increment(Role::Givers, &ranges, "UA", 1).await.unwrap();

        let top = cache.top(Role::Givers, RangeKey::Today, 10).await.unwrap();
        assert_eq!(top[0], UserCount { user_id: "UB".to_string(), count: 5 });
        assert_eq!(top[1], UserCount { user_id: "UA".to_string(), count: 3 });

        cache
            .replace_leaderboard(RangeKey::Today, &[UserCount { user_id: "UC".to_string(), count: 1 }], &[])
            .await
            .unwrap();
        let top = cache.top(Role::Givers, RangeKey::Today, 10).await.unwrap();
        assert_eq!(top, vec![UserCount { user_id: "UC".to_string(), count: 1 }]);
        assert!(cache.top(Role::Recipients, RangeKey::Today, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let cache = MemoryCache::new();
        cache.set_failing(true);
        assert!(cache.ping().await.is_err());
        assert_eq!(cache.calls(), 1);
    }
}
