pub mod file;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::models::{TokenPatch, TokenRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of `insert_if_absent`: the record as stored and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    pub record: TokenRecord,
    pub created: bool,
}

/// Durable storage for token records.
/// Implementations: PgStore (PostgreSQL), FileStore (JSON file), MemoryStore.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TokenRecord>>;

    /// Create a fresh, inactive record. A duplicate key is not an error:
    /// the existing record is returned with `created = false`.
    async fn insert_if_absent(
        &self,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome>;

    /// Apply `patch` to one record in a single step. `None` if the token is unknown.
    async fn update_fields(&self, token: &str, patch: &TokenPatch)
        -> StoreResult<Option<TokenRecord>>;

    /// All records, newest first when `order_by_created_desc`, insertion order otherwise.
    async fn list_all(&self, order_by_created_desc: bool) -> StoreResult<Vec<TokenRecord>>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Open the backend selected by `cfg.store`.
pub async fn open(cfg: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match cfg.store {
        StoreBackend::File => {
            tracing::info!(path = %cfg.data_file.display(), "using JSON file store");
            Arc::new(file::FileStore::open(&cfg.data_file).await?)
        }
        StoreBackend::Postgres => {
            tracing::info!("using PostgreSQL store");
            let pg = postgres::PgStore::connect(cfg.require_database_url()?).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; records are lost on exit");
            Arc::new(memory::MemoryStore::new())
        }
    };
    Ok(store)
}

/// Stable sort by creation time, newest first. Records created at the same
/// instant keep their relative insertion order.
pub(crate) fn sort_newest_first(records: &mut [TokenRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
