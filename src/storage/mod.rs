//! Persistence for accounts, sessions, routes, events and point gains
//!
//! A single embedded SQLite database backs every store. Each repository
//! method runs one atomic statement, so concurrent workers only rely on
//! row-level upsert and guarded-update semantics.

#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod repository;
pub mod sqlite;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{
    MockAccountStore, MockEventStore, MockPointGainStore, MockRouteStore, MockSessionStore,
};
pub use repository::{AccountStore, EventStore, PointGainStore, RouteStore, SessionStore};
pub use sqlite::{
    SqliteAccountStore, SqliteEventStore, SqlitePointGainStore, SqliteRouteStore,
    SqliteSessionStore,
};

/// Errors raised by the stores
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Shared handle to the embedded database
///
/// Cloning is cheap; all clones share one connection guarded by a mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and bootstrap the schema
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite database initialized");
        Ok(db)
    }

    /// In-memory database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_schema()?;
        Ok(db)
    }

    pub(crate) fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    username TEXT PRIMARY KEY,
                    secret TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS credentials (
                    username TEXT PRIMARY KEY,
                    sessionid TEXT NOT NULL,
                    date TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS routes (
                    id INTEGER PRIMARY KEY,
                    points INTEGER,
                    elevation INTEGER NOT NULL DEFAULT 0,
                    name TEXT NOT NULL DEFAULT '',
                    scale TEXT NOT NULL DEFAULT '',
                    distance REAL NOT NULL DEFAULT 0,
                    crawledAt TEXT
                );

                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    routeId INTEGER NOT NULL,
                    points INTEGER,
                    organizerId INTEGER
                );

                CREATE TABLE IF NOT EXISTS pointsGain (
                    eventId INTEGER NOT NULL,
                    userId INTEGER NOT NULL,
                    routePoints INTEGER NOT NULL,
                    pointsBefore INTEGER NOT NULL,
                    pointsAfter INTEGER,
                    eventDate TEXT NOT NULL,
                    PRIMARY KEY (eventId, userId)
                );

                CREATE INDEX IF NOT EXISTS idx_points_gain_pending
                    ON pointsGain(eventDate) WHERE pointsAfter IS NULL;
                "#,
        )?;

        Ok(())
    }
}

/// Every store the workers and the control surface need
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub point_gains: Arc<dyn PointGainStore>,
    pub routes: Arc<dyn RouteStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one database
    pub fn sqlite(db: &Database) -> Self {
        Self {
            sessions: Arc::new(SqliteSessionStore::new(db.clone())),
            accounts: Arc::new(SqliteAccountStore::new(db.clone())),
            point_gains: Arc::new(SqlitePointGainStore::new(db.clone())),
            routes: Arc::new(SqliteRouteStore::new(db.clone())),
            events: Arc::new(SqliteEventStore::new(db.clone())),
        }
    }

    /// In-memory stores (for testing)
    #[cfg(any(test, feature = "test-support"))]
    pub fn mock() -> Self {
        Self {
            sessions: Arc::new(MockSessionStore::new()),
            accounts: Arc::new(MockAccountStore::new()),
            point_gains: Arc::new(MockPointGainStore::new()),
            routes: Arc::new(MockRouteStore::new()),
            events: Arc::new(MockEventStore::new()),
        }
    }
}

/// Timestamp encoding used in every text column
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn decode_timestamp(
    column: &'static str,
    value: &str,
) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidValue {
            column,
            value: value.to_string(),
        })
}
