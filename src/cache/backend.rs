//! Fast cache seam: profiles as expiring JSON values, leaderboards as sorted sets

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::ranges::RangeKey;
use crate::types::{Profile, Role, UserCount};

#[derive(Debug)]
pub enum CacheError {
    Redis(redis::RedisError),
    Serialization(serde_json::Error),
    Unavailable(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Redis(e) => write!(f, "Redis error: {}", e),
            CacheError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CacheError::Unavailable(msg) => write!(f, "Cache unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

pub fn profile_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn leaderboard_key(role: Role, range: RangeKey) -> String {
    format!("leaderboard:{}:{}", role.as_str(), range.as_str())
}

/// Volatile key/value and sorted-set store. Every call may fail; callers go
/// through [`super::GuardedCache`] so failures only ever degrade to a miss.
#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, CacheError>;

    /// One round trip for many ids. Missing ids are absent from the map.
    async fn get_profiles(&self, user_ids: &[String]) -> Result<HashMap<String, Profile>, CacheError>;

    async fn put_profiles(&self, profiles: &[Profile], ttl: Duration) -> Result<(), CacheError>;

    /// Add `by` to `user_id` in the `role` leaderboard of every listed range.
    async fn increment(
        &self,
        role: Role,
        ranges: &[RangeKey],
        user_id: &str,
        by: i64,
    ) -> Result<(), CacheError>;

    async fn top(&self, role: Role, range: RangeKey, limit: usize) -> Result<Vec<UserCount>, CacheError>;

    /// Atomically clear both leaderboards of `range` and repopulate them.
    async fn replace_leaderboard(
        &self,
        range: RangeKey,
        givers: &[UserCount],
        recipients: &[UserCount],
    ) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
