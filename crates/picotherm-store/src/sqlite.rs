//! SQLite-backed hot store.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use picotherm_types::{Measurement, Series};

use crate::error::{Error, Result};
use crate::models::StoredDevice;
use crate::schema;
use crate::traits::HotStore;

/// SQLite-based store for recent picotherm readings.
///
/// The connection is serialised behind a `tokio::sync::Mutex`, so one store
/// can be shared as `Arc<dyn HotStore>` across tasks.
pub struct SqliteHotStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteHotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHotStore").finish_non_exhaustive()
    }
}

impl SqliteHotStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening hot store at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_hot_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // === Device operations ===

    /// Register a device, or refresh its `last_seen` and location.
    ///
    /// A `None` location keeps whatever location is already stored.
    pub async fn upsert_device(&self, device_id: &str, location: Option<&str>) -> Result<StoredDevice> {
        let conn = self.conn.lock().await;
        upsert_device(&conn, device_id, location)?;
        get_device(&conn, device_id)?
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    // === Measurement operations ===

    /// Insert measurements for a device, ignoring timestamps already stored.
    ///
    /// Returns the number of rows actually inserted. This is the seeding path
    /// for the hot store; picotherm does not ingest from sensors itself.
    pub async fn insert_measurements(&self, device_id: &str, measurements: &[Measurement]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        upsert_device(&tx, device_id, None)?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO measurements (device_id, timestamp_ms, temperature, humidity)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for m in measurements {
                inserted += stmt.execute(rusqlite::params![
                    device_id,
                    m.timestamp_ms,
                    m.temperature,
                    m.humidity
                ])?;
            }
        }
        tx.commit()?;

        info!("Inserted {} new measurements for {}", inserted, device_id);
        Ok(inserted)
    }
}

#[async_trait]
impl HotStore for SqliteHotStore {
    async fn query(&self, device: &str, start_ms: i64, end_ms: i64) -> Result<Series> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp_ms, temperature, humidity FROM measurements
             WHERE device_id = ?1 AND timestamp_ms >= ?2 AND timestamp_ms < ?3
             ORDER BY timestamp_ms ASC",
        )?;

        let points = stmt
            .query_map(rusqlite::params![device, start_ms, end_ms], |row| {
                Ok(Measurement::new(row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            "Hot query {} [{}, {}) returned {} rows",
            device,
            start_ms,
            end_ms,
            points.len()
        );

        Series::new(points).map_err(|source| Error::Corrupt {
            key: format!("hot:{}", device),
            source,
        })
    }

    async fn latest(&self, device: &str) -> Result<Option<Measurement>> {
        let conn = self.conn.lock().await;
        let latest = conn
            .query_row(
                "SELECT timestamp_ms, temperature, humidity FROM measurements
                 WHERE device_id = ?1 ORDER BY timestamp_ms DESC LIMIT 1",
                [device],
                |row| Ok(Measurement::new(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(latest)
    }

    async fn devices(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM devices ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

fn upsert_device(conn: &Connection, device_id: &str, location: Option<&str>) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO devices (id, location, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET
            location = COALESCE(?2, location),
            last_seen = ?3",
        rusqlite::params![device_id, location, now],
    )?;
    Ok(())
}

fn get_device(conn: &Connection, device_id: &str) -> Result<Option<StoredDevice>> {
    let device = conn
        .query_row(
            "SELECT id, location, first_seen, last_seen FROM devices WHERE id = ?",
            [device_id],
            device_from_row,
        )
        .optional()?;
    Ok(device)
}

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredDevice> {
    Ok(StoredDevice {
        id: row.get(0)?,
        location: row.get(1)?,
        first_seen: unix_seconds(row, 2)?,
        last_seen: unix_seconds(row, 3)?,
    })
}

fn unix_seconds(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}
