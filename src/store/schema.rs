//! Idempotent, non-destructive schema migration
//!
//! Older databases may lack the `ts_rfc`/`count` columns or the
//! (giver_id, recipient_id, ts) uniqueness constraint. Columns are added in
//! place; a missing constraint triggers a table rebuild inside one transaction
//! that folds duplicate keys into a single row with the summed count.

use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;

use super::StoreError;

const CREATE_AUX_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS processed_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    ts DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS user_cache (
    user_id TEXT PRIMARY KEY,
    real_name TEXT NOT NULL,
    profile_image TEXT NOT NULL DEFAULT '',
    updated_at DATETIME NOT NULL
);
"#;

const CREATE_BEERS: &str = r#"
CREATE TABLE beers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    giver_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    ts_rfc DATETIME NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    UNIQUE(giver_id, recipient_id, ts)
);
"#;

const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_beers_giver_ts ON beers(giver_id, ts_rfc);
CREATE INDEX IF NOT EXISTS idx_beers_recipient_ts ON beers(recipient_id, ts_rfc);
CREATE INDEX IF NOT EXISTS idx_beers_ts_rfc ON beers(ts_rfc);
"#;

/// RFC 3339 instant derived from the integer part of the native timestamp.
const TS_RFC_FROM_TS: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', CAST(ts AS INTEGER), 'unixepoch')";

const UNIQUE_KEY: [&str; 3] = ["giver_id", "recipient_id", "ts"];

pub(super) fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    log::info!("🔧 Running schema migrations");

    conn.execute_batch(CREATE_AUX_TABLES)?;

    let beers_exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'beers'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();

    if !beers_exists {
        conn.execute_batch(CREATE_BEERS)?;
        log::info!("   ├─ Created table beers");
    } else {
        upgrade_columns(conn)?;
        if !has_unique_key(conn)? {
            rebuild_with_unique_key(conn)?;
        }
    }

    conn.execute_batch(CREATE_INDEXES)?;
    log::info!("   └─ ✅ Schema up to date");
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(columns)
}

fn upgrade_columns(conn: &Connection) -> Result<(), StoreError> {
    let columns = table_columns(conn, "beers")?;

    if !columns.contains("ts_rfc") {
        conn.execute_batch("ALTER TABLE beers ADD COLUMN ts_rfc DATETIME")?;
        log::info!("   ├─ Added column beers.ts_rfc");
    }
    if !columns.contains("count") {
        conn.execute_batch("ALTER TABLE beers ADD COLUMN count INTEGER NOT NULL DEFAULT 1")?;
        log::info!("   ├─ Added column beers.count");
    }

    let backfilled = conn.execute(
        &format!("UPDATE beers SET ts_rfc = {} WHERE ts_rfc IS NULL", TS_RFC_FROM_TS),
        [],
    )?;
    if backfilled > 0 {
        log::info!("   ├─ Backfilled ts_rfc on {} rows", backfilled);
    }
    Ok(())
}

/// True when some unique index on `beers` covers exactly the ledger key.
fn has_unique_key(conn: &Connection) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare("PRAGMA index_list(beers)")?;
    let unique_indexes = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let wanted: HashSet<&str> = UNIQUE_KEY.iter().copied().collect();

    for (name, unique) in unique_indexes {
        if unique == 0 {
            continue;
        }
        let mut info = conn.prepare(&format!("PRAGMA index_info(\"{}\")", name))?;
        let columns = info
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<Result<HashSet<_>, _>>()?;
        if columns.len() == wanted.len() && columns.iter().all(|c| wanted.contains(c.as_str())) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn rebuild_with_unique_key(conn: &mut Connection) -> Result<(), StoreError> {
    log::warn!("   ├─ beers lacks UNIQUE(giver_id, recipient_id, ts), rebuilding");

    let tx = conn.transaction()?;
    tx.execute_batch("ALTER TABLE beers RENAME TO beers_legacy")?;
    tx.execute_batch(CREATE_BEERS)?;
    let rows = tx.execute(
        &format!(
            r#"
            INSERT INTO beers (giver_id, recipient_id, ts, ts_rfc, count)
            SELECT giver_id, recipient_id, ts,
                   COALESCE(MAX(ts_rfc), {}),
                   SUM(COALESCE(count, 1))
            FROM beers_legacy
            GROUP BY giver_id, recipient_id, ts
            "#,
            TS_RFC_FROM_TS
        ),
        [],
    )?;
    tx.execute_batch("DROP TABLE beers_legacy")?;
    tx.commit()?;

    log::info!("   ├─ Rebuilt beers with {} distinct rows", rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn legacy_db(create_sql: &str) -> (NamedTempFile, Connection) {
        let temp = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp.path()).unwrap();
        conn.execute_batch(create_sql).unwrap();
        (temp, conn)
    }

    #[test]
    fn test_fresh_database() {
        let temp = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp.path()).unwrap();

        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        assert!(has_unique_key(&conn).unwrap());
        let columns = table_columns(&conn, "beers").unwrap();
        assert!(columns.contains("ts_rfc"));
        assert!(columns.contains("count"));
    }

    #[test]
    fn test_adds_missing_columns_and_backfills() {
        let (_temp, mut conn) = legacy_db(
            r#"
            CREATE TABLE beers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                giver_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                UNIQUE(giver_id, recipient_id, ts)
            );
            INSERT INTO beers (giver_id, recipient_id, ts) VALUES ('UA', 'UB', '1700000000.000100');
            "#,
        );

        migrate(&mut conn).unwrap();

        let (ts_rfc, count): (String, i64) = conn
            .query_row("SELECT ts_rfc, count FROM beers", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(ts_rfc, "2023-11-14T22:13:20Z");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rebuild_collapses_duplicates() {
        let (_temp, mut conn) = legacy_db(
            r#"
            CREATE TABLE beers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                giver_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                ts_rfc DATETIME,
                count INTEGER NOT NULL DEFAULT 1
            );
            INSERT INTO beers (giver_id, recipient_id, ts, ts_rfc, count)
                VALUES ('UA', 'UB', '1700000000.1', '2023-11-14T22:13:20Z', 2);
            INSERT INTO beers (giver_id, recipient_id, ts, ts_rfc, count)
                VALUES ('UA', 'UB', '1700000000.1', '2023-11-14T22:13:20Z', 3);
            INSERT INTO beers (giver_id, recipient_id, ts, ts_rfc, count)
                VALUES ('UA', 'UC', '1700000000.1', '2023-11-14T22:13:20Z', 1);
            "#,
        );

        assert!(!has_unique_key(&conn).unwrap());
        migrate(&mut conn).unwrap();
        assert!(has_unique_key(&conn).unwrap());

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM beers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);

        let total: i64 = conn
            .query_row(
                "SELECT count FROM beers WHERE giver_id = 'UA' AND recipient_id = 'UB'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total, 5);

        let legacy_left: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE name = 'beers_legacy'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap();
        assert!(legacy_left.is_none());
    }
}
