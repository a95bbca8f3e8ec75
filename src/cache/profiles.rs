//! Tiered profile lookups: fast cache → upstream → durable copy

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::GuardedCache;
use crate::slack::{UserDirectory, UserInfo};
use crate::store::SqliteStore;
use crate::types::Profile;

pub const PROFILE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const MAX_BATCH_PROFILES: usize = 100;

pub struct ProfileResolver {
    cache: Arc<GuardedCache>,
    store: SqliteStore,
    directory: Arc<dyn UserDirectory>,
}

impl ProfileResolver {
    pub fn new(cache: Arc<GuardedCache>, store: SqliteStore, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            cache,
            store,
            directory,
        }
    }

    /// Resolve one profile. `None` when no tier has a usable (named) copy.
    pub async fn resolve(&self, user_id: &str) -> Option<Profile> {
        if let Some(profile) = self.cache.get_profile(user_id).await {
            return Some(profile);
        }
        let profile = self.resolve_uncached(user_id).await?;
        if profile.fresh {
            self.cache
                .put_profiles(std::slice::from_ref(&profile.profile), PROFILE_TTL)
                .await;
        }
        Some(profile.profile)
    }

    /// Resolve up to [`MAX_BATCH_PROFILES`] ids; extra ids are ignored, blanks
    /// dropped and duplicates collapsed. Unresolvable ids are absent from the map.
    pub async fn resolve_many(&self, user_ids: &[String]) -> HashMap<String, Profile> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = user_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .take(MAX_BATCH_PROFILES)
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return HashMap::new();
        }

        let mut found = self.cache.get_profiles(&ids).await;
        let misses: Vec<String> = ids
            .into_iter()
            .filter(|id| !found.contains_key(id))
            .collect();
        let mut fresh = Vec::new();

        for id in &misses {
            if let Some(resolved) = self.resolve_uncached(id).await {
                if resolved.fresh {
                    fresh.push(resolved.profile.clone());
                }
                found.insert(id.clone(), resolved.profile);
            }
        }

        self.cache.put_profiles(&fresh, PROFILE_TTL).await;
        found
    }

    /// Upstream first, durable copy second. Fresh upstream data is written
    /// through to the durable store here; the caller handles the fast cache.
    async fn resolve_uncached(&self, user_id: &str) -> Option<Resolved> {
        match self.directory.user_info(user_id).await {
            Ok(info) if !info.real_name.is_empty() => {
                let profile = profile_from(info);
                if let Err(e) = self.store.save_profile(&profile) {
                    log::warn!("⚠️  Could not persist profile {}: {}", user_id, e);
                }
                return Some(Resolved {
                    profile,
                    fresh: true,
                });
            }
            Ok(_) => log::debug!("users.info returned no name for {}", user_id),
            Err(e) => log::warn!("⚠️  users.info failed for {}: {}", user_id, e),
        }

        match self.store.cached_profile(user_id) {
            Ok(Some(profile)) if !profile.display_name.is_empty() => Some(Resolved {
                profile,
                fresh: false,
            }),
            Ok(_) => None,
            Err(e) => {
                log::error!("❌ Durable profile lookup failed for {}: {}", user_id, e);
                None
            }
        }
    }
}

struct Resolved {
    profile: Profile,
    /// Came from upstream just now and should be written to the fast cache.
    fresh: bool,
}

fn profile_from(info: UserInfo) -> Profile {
    Profile {
        user_id: info.user_id,
        display_name: info.real_name,
        avatar_url: info.avatar_url,
        cached_at: Utc::now(),
    }
}
