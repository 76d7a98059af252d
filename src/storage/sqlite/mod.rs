//! SQLite custody store.
//!
//! Write transactions open with `BEGIN IMMEDIATE`, taking the database write
//! lock up front. Concurrent writers queue on the busy timeout instead of
//! racing to upgrade a shared lock. WAL mode lets readers proceed meanwhile.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;

use crate::storage::schema::SQLITE_SCHEMA;
use crate::storage::sql::SqlTx;
use crate::storage::{CustodyBackend, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of the custody store.
#[derive(Clone)]
pub struct SqliteCustodyStore {
    pool: SqlitePool,
}

impl SqliteCustodyStore {
    /// Wrap an existing pool. Call [`init`](Self::init) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn connect(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), max_connections, "Opened SQLite custody store");
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and triggers if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CustodyBackend for SqliteCustodyStore {
    type Tx = SqlTx<Sqlite>;

    async fn begin_write(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(SqlTx::new(tx, true))
    }

    async fn begin_read(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(SqlTx::new(tx, false))
    }
}
