//! Storage implementations.

use std::sync::Arc;

#[allow(unused_imports)]
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};

pub use crate::interfaces::{CustodyStore, LedgerStore, Result, StorageError};

pub mod mock;
pub mod schema;
pub mod sql;
mod transactional;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use mock::MockCustodyStore;
pub use transactional::{CustodyBackend, CustodyTx};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCustodyStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresCustodyStore;

/// Initialize storage based on configuration.
///
/// Connects to the configured backend, creates the schema if needed and
/// returns the custody store.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn CustodyStore>> {
    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(
                "Storage: sqlite at {} ({} connections)",
                config.sqlite.path, config.sqlite.max_connections
            );
            let store =
                SqliteCustodyStore::connect(&config.sqlite.path, config.sqlite.max_connections)
                    .await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unsupported(
                "sqlite feature not enabled".to_string(),
            ))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            info!(
                "Storage: postgres ({} connections)",
                config.postgres.max_connections
            );
            let store =
                PostgresCustodyStore::connect(&config.postgres.uri, config.postgres.max_connections)
                    .await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => {
            error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
            Err(StorageError::Unsupported(
                "postgres feature not enabled".to_string(),
            ))
        }
    }
}
