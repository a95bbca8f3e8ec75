//! Gift ledger and processed-event markers

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::params;

use super::{SqliteStore, StoreError};
use crate::types::{DateRange, LedgerEntry, Role, UserCount};

pub(crate) fn format_ts_rfc(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts_rfc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl SqliteStore {
    /// Atomically record `event_id` as processed.
    ///
    /// Returns `true` when this call inserted the marker and the caller owns the
    /// event, `false` when some earlier call already did. A single
    /// `INSERT OR IGNORE` carries the whole check-and-mark, so concurrent callers
    /// (even on separate connections) see exactly one `true`.
    pub fn try_mark_event_processed(
        &self,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO processed_events (event_id, ts) VALUES (?1, ?2)",
            params![event_id, format_ts_rfc(&at)],
        )?;
        Ok(inserted == 1)
    }

    pub fn is_event_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT 1 FROM processed_events WHERE event_id = ?1")?;
        Ok(stmt.exists([event_id])?)
    }

    /// Write one ledger row. A second write with the same
    /// (giver, recipient, ts) replaces the count rather than adding to it.
    pub fn upsert_gift(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO beers (giver_id, recipient_id, ts, ts_rfc, count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(giver_id, recipient_id, ts) DO UPDATE SET
                count = excluded.count,
                ts_rfc = excluded.ts_rfc
            "#,
            params![
                entry.giver_id,
                entry.recipient_id,
                entry.ts,
                format_ts_rfc(&entry.ts_rfc),
                entry.count,
            ],
        )?;
        Ok(())
    }

    /// Sum of gifts `giver_id` handed out on the given UTC calendar day.
    pub fn given_on_day(&self, giver_id: &str, day: NaiveDate) -> Result<i64, StoreError> {
        self.count_for(Role::Givers, giver_id, &DateRange::single_day(day))
    }

    pub fn count_given(&self, user_id: &str, range: &DateRange) -> Result<i64, StoreError> {
        self.count_for(Role::Givers, user_id, range)
    }

    pub fn count_received(&self, user_id: &str, range: &DateRange) -> Result<i64, StoreError> {
        self.count_for(Role::Recipients, user_id, range)
    }

    fn count_for(&self, role: Role, user_id: &str, range: &DateRange) -> Result<i64, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.lock()?;
        let total = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(count), 0) FROM beers \
                 WHERE {} = ?1 AND substr(ts_rfc, 1, 10) BETWEEN ?2 AND ?3",
                role.column()
            ),
            params![user_id, start, end],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(total)
    }

    /// Every user id that ever appeared in the given role, sorted.
    pub fn distinct_users(&self, role: Role) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let column = role.column();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {col} FROM beers ORDER BY {col}",
            col = column
        ))?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Highest totals for `role` within `range` (all time when `None`).
    pub fn top_users(
        &self,
        role: Role,
        range: Option<&DateRange>,
        limit: usize,
    ) -> Result<Vec<UserCount>, StoreError> {
        let column = role.column();
        let conn = self.lock()?;

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(UserCount {
                user_id: row.get(0)?,
                count: row.get(1)?,
            })
        };

        let rows = match range {
            Some(range) => {
                let (start, end) = range.bounds();
                let mut stmt = conn.prepare(&format!(
                    "SELECT {col}, SUM(count) AS total FROM beers \
                     WHERE substr(ts_rfc, 1, 10) BETWEEN ?1 AND ?2 \
                     GROUP BY {col} ORDER BY total DESC, {col} ASC LIMIT ?3",
                    col = column
                ))?;
                let rows = stmt
                    .query_map(params![start, end, limit as i64], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {col}, SUM(count) AS total FROM beers \
                     GROUP BY {col} ORDER BY total DESC, {col} ASC LIMIT ?1",
                    col = column
                ))?;
                let rows = stmt
                    .query_map(params![limit as i64], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    /// All ledger rows written by `giver_id`, oldest first.
    pub fn entries_by_giver(&self, giver_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT giver_id, recipient_id, ts, ts_rfc, count FROM beers \
             WHERE giver_id = ?1 ORDER BY ts_rfc, recipient_id",
        )?;
        let entries = stmt
            .query_map([giver_id], |row| {
                let ts_rfc: String = row.get(3)?;
                Ok(LedgerEntry {
                    giver_id: row.get(0)?,
                    recipient_id: row.get(1)?,
                    ts: row.get(2)?,
                    ts_rfc: parse_ts_rfc(&ts_rfc),
                    count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry(giver: &str, recipient: &str, ts: &str, at: DateTime<Utc>, count: i64) -> LedgerEntry {
        LedgerEntry {
            giver_id: giver.to_string(),
            recipient_id: recipient.to_string(),
            ts: ts.to_string(),
            ts_rfc: at,
            count,
        }
    }

    #[test]
    fn test_mark_event_once() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("bot.db")).unwrap();

        assert!(store.try_mark_event_processed("ev-1", Utc::now()).unwrap());
        assert!(!store.try_mark_event_processed("ev-1", Utc::now()).unwrap());
        assert!(store.is_event_processed("ev-1").unwrap());
        assert!(!store.is_event_processed("ev-2").unwrap());
    }

    #[test]
    fn test_concurrent_admission_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = if i % 2 == 0 { first.clone() } else { second.clone() };
                std::thread::spawn(move || {
                    store.try_mark_event_processed("shared", Utc::now()).unwrap()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("bot.db")).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        store.upsert_gift(&entry("UA", "UB", "1709632800.000100", at, 2)).unwrap();
        store.upsert_gift(&entry("UA", "UB", "1709632800.000100", at, 5)).unwrap();

        let entries = store.entries_by_giver("UA").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].count, 5);
        assert_eq!(entries[0].ts_rfc, at);
    }

    #[test]
    fn test_counts_by_day_and_range() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("bot.db")).unwrap());
        let day1 = Utc.with_ymd_and_hms(2024, 3, 5, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 6, 0, 1, 0).unwrap();

        store.upsert_gift(&entry("UA", "UB", "1.1", day1, 3)).unwrap();
        store.upsert_gift(&entry("UA", "UC", "1.2", day1, 1)).unwrap();
        store.upsert_gift(&entry("UA", "UB", "2.1", day2, 4)).unwrap();
        store.upsert_gift(&entry("UB", "UA", "2.2", day2, 2)).unwrap();

        assert_eq!(store.given_on_day("UA", day1.date_naive()).unwrap(), 4);
        assert_eq!(store.given_on_day("UA", day2.date_naive()).unwrap(), 4);
        assert_eq!(store.given_on_day("UZ", day2.date_naive()).unwrap(), 0);

        let both = DateRange::new(day1.date_naive(), day2.date_naive());
        assert_eq!(store.count_given("UA", &both).unwrap(), 8);
        assert_eq!(store.count_received("UB", &both).unwrap(), 7);

        assert_eq!(store.distinct_users(Role::Givers).unwrap(), vec!["UA", "UB"]);
        assert_eq!(
            store.distinct_users(Role::Recipients).unwrap(),
            vec!["UA", "UB", "UC"]
        );

        let top = store.top_users(Role::Recipients, None, 2).unwrap();
        assert_eq!(top[0], UserCount { user_id: "UB".to_string(), count: 7 });
        assert_eq!(top.len(), 2);

        let day2_only = DateRange::single_day(day2.date_naive());
        let top = store.top_users(Role::Givers, Some(&day2_only), 10).unwrap();
        assert_eq!(
            top,
            vec![
                UserCount { user_id: "UA".to_string(), count: 4 },
                UserCount { user_id: "UB".to_string(), count: 2 },
            ]
        );
    }
}
