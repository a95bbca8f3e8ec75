use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::backend::{leaderboard_key, profile_key, CacheError, FastCache};
use super::ranges::RangeKey;
use crate::types::{Profile, Role, UserCount};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed fast cache.
///
/// The multiplexed connection is established lazily and dropped after any
/// failed command, so a restarted Redis is picked up on the next call.
pub struct RedisCache {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.cached_connection() {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(RESPONSE_TIMEOUT, CONNECT_TIMEOUT)
            .await?;
        if let Ok(mut slot) = self.conn.lock() {
            *slot = Some(conn.clone());
        }
        Ok(conn)
    }

    fn cached_connection(&self) -> Option<MultiplexedConnection> {
        self.conn.lock().ok().and_then(|slot| slot.clone())
    }

    fn reset_connection(&self) {
        if let Ok(mut slot) = self.conn.lock() {
            *slot = None;
        }
    }

    fn checked<T>(&self, result: redis::RedisResult<T>) -> Result<T, CacheError> {
        result.map_err(|e| {
            if e.is_io_error()
                || e.is_timeout()
                || e.is_connection_dropped()
                || e.is_connection_refusal()
            {
                self.reset_connection();
            }
            CacheError::Redis(e)
        })
    }
}

#[async_trait]
impl FastCache for RedisCache {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = self.checked(conn.get(profile_key(user_id)).await)?;
        match raw.map(|json| serde_json::from_str::<Profile>(&json)) {
            Some(Ok(profile)) => Ok(Some(profile)),
            Some(Err(e)) => {
                log::debug!("⚠️  Dropping unreadable cached profile {}: {}", user_id, e);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn get_profiles(&self, user_ids: &[String]) -> Result<HashMap<String, Profile>, CacheError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection().await?;
        let keys: Vec<String> = user_ids.iter().map(|id| profile_key(id)).collect();
        let values: Vec<Option<String>> =
            self.checked(redis::cmd("MGET").arg(&keys).query_async(&mut conn).await)?;

        let mut found = HashMap::new();
        for (id, value) in user_ids.iter().zip(values) {
            if let Some(json) = value {
                match serde_json::from_str::<Profile>(&json) {
                    Ok(profile) => {
                        found.insert(id.clone(), profile);
                    }
                    Err(e) => log::debug!("⚠️  Dropping unreadable cached profile {}: {}", id, e),
                }
            }
        }
        Ok(found)
    }

    async fn put_profiles(&self, profiles: &[Profile], ttl: Duration) -> Result<(), CacheError> {
        if profiles.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for profile in profiles {
            let json = serde_json::to_string(profile)?;
            pipe.cmd("SET")
                .arg(profile_key(&profile.user_id))
                .arg(json)
                .arg("EX")
                .arg(ttl.as_secs())
                .ignore();
        }
        let _: () = self.checked(pipe.query_async(&mut conn).await)?;
        Ok(())
    }

    async fn increment(
        &self,
        role: Role,
        ranges: &[RangeKey],
        user_id: &str,
        by: i64,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for range in ranges {
            pipe.cmd("ZINCRBY")
                .arg(leaderboard_key(role, *range))
                .arg(by)
                .arg(user_id)
                .ignore();
        }
        let _: () = self.checked(pipe.query_async(&mut conn).await)?;
        Ok(())
    }

    async fn top(&self, role: Role, range: RangeKey, limit: usize) -> Result<Vec<UserCount>, CacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let rows: Vec<(String, f64)> = self.checked(
            conn.zrevrange_withscores(leaderboard_key(role, range), 0, limit as isize - 1)
                .await,
        )?;
        Ok(rows
            .into_iter()
            .map(|(user_id, score)| UserCount {
                user_id,
                count: score as i64,
            })
            .collect())
    }

    async fn replace_leaderboard(
        &self,
        range: RangeKey,
        givers: &[UserCount],
        recipients: &[UserCount],
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (role, rows) in [(Role::Givers, givers), (Role::Recipients, recipients)] {
            let key = leaderboard_key(role, range);
            pipe.cmd("DEL").arg(&key).ignore();
            if !rows.is_empty() {
                let cmd = pipe.cmd("ZADD").arg(&key);
                for row in rows {
                    cmd.arg(row.count).arg(&row.user_id);
                }
                cmd.ignore();
            }
        }
        let _: () = self.checked(pipe.query_async(&mut conn).await)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = self.checked(redis::cmd("PING").query_async(&mut conn).await)?;
        Ok(())
    }
}
