//! Database layer - content stores and transactions

pub mod memory;
pub mod postgres;
pub mod traits;
pub mod transaction;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{ContentStore, StoreTransaction};
pub use transaction::TransactionManager;

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    config::{StorageBackend, StorageConfig},
    Error, Result,
};

/// Configured databases, addressed by the `{db}` URL segment.
#[derive(Clone, Default)]
pub struct Databases {
    stores: HashMap<String, Arc<dyn ContentStore>>,
}

impl Databases {
    /// Open one store per configured database id.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let mut databases = Self::default();

        match config.backend {
            StorageBackend::Memory => {
                for id in &config.databases {
                    databases.insert(Arc::new(MemoryStore::new(id.clone())));
                }
            }
            StorageBackend::Postgres => {
                let pool = PostgresStore::connect(config).await?;
                for id in &config.databases {
                    databases.insert(Arc::new(PostgresStore::new(pool.clone(), id.clone())));
                }
            }
        }

        tracing::info!(
            backend = ?config.backend,
            databases = ?config.databases,
            "Content databases ready"
        );

        Ok(databases)
    }

    pub fn insert(&mut self, store: Arc<dyn ContentStore>) {
        self.stores.insert(store.database_id().to_string(), store);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ContentStore>> {
        self.stores
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Database '{id}'")))
    }

    /// Database ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Fresh per-call transaction manager on database `id`.
    pub fn transaction(&self, id: &str) -> Result<Arc<TransactionManager>> {
        Ok(Arc::new(TransactionManager::new(self.get(id)?)))
    }
}
