//! Hot store schema.
//!
//! The version lives in a single-row `schema_version` table. A database
//! without that table is empty and gets the current schema; a newer version
//! is refused rather than read with the wrong layout.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Create the tables on a fresh database, or check the version of an
/// existing one.
pub fn initialize(conn: &Connection) -> Result<()> {
    match stored_version(conn)? {
        0 => {
            conn.execute_batch(SCHEMA_V1)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
                [SCHEMA_VERSION],
            )?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

fn stored_version(conn: &Connection) -> Result<i32> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| row.get(0))?)
}

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY,
        location TEXT,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL
    );

    -- One row per reading; the primary key doubles as the range index.
    CREATE TABLE IF NOT EXISTS measurements (
        device_id TEXT NOT NULL REFERENCES devices(id),
        timestamp_ms INTEGER NOT NULL,
        temperature REAL NOT NULL,
        humidity REAL NOT NULL,
        PRIMARY KEY (device_id, timestamp_ms)
    ) WITHOUT ROWID;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(table_names(&conn), vec!["devices", "measurements", "schema_version"]);
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);

        // Opening again leaves the database as is.
        initialize(&conn).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute("UPDATE schema_version SET version = 7", []).unwrap();

        assert!(matches!(
            initialize(&conn),
            Err(Error::UnsupportedSchema { found: 7, supported: 1 })
        ));
    }
}
