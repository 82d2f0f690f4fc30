pub mod cached;
pub mod filter;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use filter::{DimensionCount, HitFilter, StatsDimension};
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{HitInsert, Storage, StorageError, StorageResult};

use crate::config::{DatabaseBackend, DatabaseConfig};
use anyhow::Result;
use std::sync::Arc;

/// Connect the configured backend and make sure the schema exists
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };
    storage.init().await?;
    Ok(storage)
}
