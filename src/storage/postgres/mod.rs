//! PostgreSQL custody store.
//!
//! Writers lock the affected property row (`SELECT ... FOR UPDATE`) and take
//! a transaction-scoped advisory lock before reading the ledger head, so
//! chain links are assigned one writer at a time. Partial unique indexes back
//! the one-pending-transfer and one-active-credential rules.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::debug;

use crate::storage::schema::POSTGRES_SCHEMA;
use crate::storage::sql::SqlTx;
use crate::storage::{CustodyBackend, Result};

/// PostgreSQL implementation of the custody store.
#[derive(Clone)]
pub struct PostgresCustodyStore {
    pool: PgPool,
}

impl PostgresCustodyStore {
    /// Wrap an existing pool. Call [`init`](Self::init) before use.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        debug!(max_connections, "Connected to PostgreSQL custody store");
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and triggers if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(POSTGRES_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CustodyBackend for PostgresCustodyStore {
    type Tx = SqlTx<Postgres>;

    async fn begin_write(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(SqlTx::new(tx, true))
    }

    async fn begin_read(&self) -> Result<Self::Tx> {
        let tx = self
            .pool
            .begin_with("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .await?;
        Ok(SqlTx::new(tx, false))
    }
}
