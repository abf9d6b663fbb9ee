//! Storage layer for dronehub.
//!
//! This module provides the `SQLite` store shared by the drone registry and
//! the telemetry log. Callers never hold the connection directly: each
//! operation borrows it through a [`Session`], which is released when it
//! goes out of scope on every path, errors included.

pub mod migrations;
pub mod schema;

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Busy timeout applied when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared store for drones and telemetry.
///
/// Provides persistent storage using `SQLite` with:
/// - Foreign keys enforced on every connection
/// - WAL journaling for file-backed databases
/// - Scoped access through [`Storage::session`]
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

/// Exclusive, scoped access to the store's connection.
///
/// Dereferences to [`Connection`]; multi-step mutations open a
/// transaction on it, which rolls back unless committed.
#[derive(Debug)]
pub struct Session<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`Storage::open`], waiting up to `busy_timeout` on a locked database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(busy_timeout)?;
        Self::configure(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::configure(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(conn)
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the connection for the duration of one operation.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for pooled backends.
    pub fn session(&self) -> Result<Session<'_>> {
        // A panic inside a session unwinds through any open transaction,
        // which rolls back, so the connection is still consistent.
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Session { conn })
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let session = self.session()?;

        let drones: i64 = session.query_row("SELECT COUNT(*) FROM drones", [], |row| row.get(0))?;
        let readings: i64 =
            session.query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))?;

        let (oldest, newest): (Option<String>, Option<String>) = session.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM telemetry",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        drop(session);

        let oldest_reading = oldest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let newest_reading = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_drones: u64::try_from(drones).unwrap_or(0),
            total_readings: u64::try_from(readings).unwrap_or(0),
            oldest_reading,
            newest_reading,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Number of registered drones.
    pub total_drones: u64,
    /// Number of stored telemetry readings.
    pub total_readings: u64,
    /// Timestamp of the oldest reading.
    pub oldest_reading: Option<DateTime<Utc>>,
    /// Timestamp of the newest reading.
    pub newest_reading: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Encode a timestamp as fixed-width RFC 3339, so text order is time order.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a timestamp column written by [`encode_timestamp`].
pub(crate) fn decode_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_session_enforces_foreign_keys() {
        let storage = create_test_storage();
        let session = storage.session().unwrap();
        let enabled: i64 = session
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let storage = create_test_storage();
        {
            let mut session = storage.session().unwrap();
            let tx = session.transaction().unwrap();
            tx.execute(
                "INSERT INTO drones (name, status, battery, created_at, updated_at)
                 VALUES ('ghost', 'idle', 100, 'x', 'x')",
                [],
            )
            .unwrap();
        }
        assert_eq!(storage.stats().unwrap().total_drones, 0);
    }

    #[test]
    fn test_stats_empty() {
        let stats = create_test_storage().stats().unwrap();

        assert_eq!(stats.total_drones, 0);
        assert_eq!(stats.total_readings, 0);
        assert!(stats.oldest_reading.is_none());
        assert!(stats.newest_reading.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_file_based_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("fleet.db");

        let storage = Storage::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(storage.path(), db_path);
        assert!(storage.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fleet.db");

        drop(Storage::open(&db_path).unwrap());
        let storage = Storage::open(&db_path).unwrap();
        assert_eq!(storage.stats().unwrap().total_drones, 0);
    }

    #[test]
    fn test_timestamp_encoding_is_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let a = encode_timestamp(&early);
        let b = encode_timestamp(&late);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn test_timestamp_decode_round_trip() {
        let ts = now();
        let decoded = decode_timestamp(0, &encode_timestamp(&ts)).unwrap();
        assert_eq!(decoded, ts);
        assert!(decode_timestamp(0, "yesterday").is_err());
    }

    #[test]
    fn test_storage_stats_serialize() {
        let stats = StorageStats {
            total_drones: 2,
            total_readings: 10,
            oldest_reading: None,
            newest_reading: None,
            db_size_bytes: 1024,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("total_readings"));
    }
}
