//! Durable copy of upstream user profiles

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::ledger::format_ts_rfc;
use super::{SqliteStore, StoreError};
use crate::types::Profile;

impl SqliteStore {
    pub fn cached_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, real_name, profile_image, updated_at FROM user_cache WHERE user_id = ?1",
        )?;
        let profile = stmt
            .query_row([user_id], |row| {
                let updated_at: String = row.get(3)?;
                // Older databases allow NULL here.
                let avatar_url: Option<String> = row.get(2)?;
                Ok(Profile {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    avatar_url: avatar_url.unwrap_or_default(),
                    cached_at: DateTime::parse_from_rfc3339(&updated_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })
            .optional()?;
        Ok(profile)
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO user_cache (user_id, real_name, profile_image, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                real_name = excluded.real_name,
                profile_image = excluded.profile_image,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.user_id,
                profile.display_name,
                profile.avatar_url,
                format_ts_rfc(&profile.cached_at),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_profile_round_trip_and_overwrite() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("bot.db")).unwrap();
        assert!(store.cached_profile("U1").unwrap().is_none());

        let mut profile = Profile {
            user_id: "U1".to_string(),
            display_name: "Ada".to_string(),
            avatar_url: "https://img/1.png".to_string(),
            cached_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        store.save_profile(&profile).unwrap();

        profile.display_name = "Ada L.".to_string();
        store.save_profile(&profile).unwrap();

        assert_eq!(store.cached_profile("U1").unwrap(), Some(profile));
    }

    #[test]
    fn test_null_profile_image_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE user_cache (
                    user_id TEXT PRIMARY KEY,
                    real_name TEXT NOT NULL,
                    profile_image TEXT,
                    updated_at DATETIME NOT NULL
                );
                INSERT INTO user_cache VALUES ('U2', 'Grace', NULL, '2024-01-01T00:00:00Z');",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let profile = store.cached_profile("U2").unwrap().unwrap();
        assert_eq!(profile.display_name, "Grace");
        assert_eq!(profile.avatar_url, "");
    }
}
