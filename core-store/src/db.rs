//! # Database Connection Pool Module
//!
//! SQLite connection pooling for the offline snapshot store.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for better concurrency (multiple readers, one writer)
//! - **Foreign Keys**: Enforced so song deletions cascade to sections and arrangements
//! - **In-Place Schema**: `CREATE ... IF NOT EXISTS` statements applied
//!   individually on every open, so a second open over the same database is
//!   a no-op and concurrent first-run races are harmless
//!
//! ## Testing
//!
//! For tests, use in-memory databases:
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Schema statements, applied one at a time.
///
/// Each statement is idempotent; a failure whose message says the object
/// already exists is tolerated so two racing first opens both succeed.
const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS setlists (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        date TEXT NOT NULL,
        theme TEXT,
        user_id TEXT NOT NULL,
        downloaded_at INTEGER NOT NULL,
        songs_json TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS songs (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist TEXT,
        media_url TEXT,
        thumbnail_url TEXT,
        key TEXT,
        tempo INTEGER,
        time_signature TEXT,
        default_transpose INTEGER NOT NULL DEFAULT 0,
        user_id TEXT NOT NULL,
        capo INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS song_sections (
        id TEXT PRIMARY KEY,
        song_id TEXT NOT NULL,
        name TEXT NOT NULL,
        position INTEGER NOT NULL,
        bar_count INTEGER,
        color TEXT,
        lyrics TEXT,
        chords TEXT,
        section_type TEXT,
        time_signature TEXT,
        FOREIGN KEY (song_id) REFERENCES songs(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS arrangements (
        id TEXT PRIMARY KEY,
        song_id TEXT NOT NULL,
        section_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        repeat_count INTEGER,
        notes TEXT,
        FOREIGN KEY (song_id) REFERENCES songs(id) ON DELETE CASCADE,
        FOREIGN KEY (section_id) REFERENCES song_sections(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS live_state_cache (
        id INTEGER PRIMARY KEY,
        setlist_id TEXT NOT NULL,
        song_index INTEGER NOT NULL DEFAULT 0,
        section_index INTEGER NOT NULL DEFAULT 0,
        bar INTEGER NOT NULL DEFAULT 0,
        transpose INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_song_sections_song_id ON song_sections(song_id)",
    "CREATE INDEX IF NOT EXISTS idx_arrangements_song_id ON arrangements(song_id)",
];

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path or `:memory:` for an in-memory database
    pub database_url: String,

    /// Minimum number of connections kept open.
    ///
    /// Must stay at least 1 for in-memory databases, where the last
    /// connection closing discards the data.
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration backed by a database file
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Create a configuration for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Set the minimum number of connections
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool with the schema applied.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] when the database cannot be opened on
/// this platform or path — callers should treat that as "offline mode
/// unavailable", not as a fatal condition.
pub async fn create_pool(config: &StoreConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening offline store"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open offline store");
            StoreError::Unavailable(e.to_string())
        })?;

    ensure_schema(&pool).await?;

    debug!("Offline store ready");
    Ok(pool)
}

/// Create a connection pool for testing with an in-memory database
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(&StoreConfig::in_memory()).await
}

/// Apply schema statements one at a time.
///
/// A statement failing because the object already exists is expected when
/// two opens race on first run and is logged at debug level only.
async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        if let Err(e) = sqlx::query(statement).execute(pool).await {
            if e.to_string().contains("already exists") {
                debug!(error = %e, "Schema object already exists, continuing");
                continue;
            }
            warn!(error = %e, "Schema statement failed");
            return Err(e.into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_pool() {
        let pool = create_pool(&StoreConfig::in_memory()).await;
        assert!(pool.is_ok(), "Should create in-memory pool successfully");
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        // Re-applying the schema over an initialized database is a no-op
        assert!(ensure_schema(&pool).await.is_ok());
        assert!(ensure_schema(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_schema_creates_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in [
            "setlists",
            "songs",
            "song_sections",
            "arrangements",
            "live_state_cache",
        ] {
            let result: (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(result.0, 1, "Table {} should exist", table);
        }
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = StoreConfig::new("offline.db")
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5));

        assert_eq!(config.database_url, "sqlite:offline.db");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }
}
