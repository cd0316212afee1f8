//! Shared transaction handle for one HTTP call

use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::{ContentStore, StoreTransaction};
use crate::{models::ContentObject, Error, Result};

/// Transaction manager shared (via `Arc`) by the outer request and every
/// sub-request built from it.
///
/// A store transaction is opened lazily on first use. `commit` and `abort`
/// end the current unit of work; the next operation opens a fresh one on the
/// same store, which is how eager-commit batches get one commit boundary per
/// item. Operations are serialized by an async mutex, so exactly one caller
/// mutates the transaction at a time.
pub struct TransactionManager {
    store: Arc<dyn ContentStore>,
    current: Mutex<Option<Box<dyn StoreTransaction>>>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("database", &self.store.database_id())
            .finish()
    }
}

impl TransactionManager {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            current: Mutex::new(None),
        }
    }

    pub fn database_id(&self) -> &str {
        self.store.database_id()
    }

    /// Commit the open transaction, if any.
    pub async fn commit(&self) -> Result<()> {
        let txn = self.current.lock().await.take();
        match txn {
            Some(txn) => txn.commit().await,
            None => Ok(()),
        }
    }

    /// Roll back the open transaction, if any.
    pub async fn abort(&self) -> Result<()> {
        let txn = self.current.lock().await.take();
        match txn {
            Some(txn) => txn.rollback().await,
            None => Ok(()),
        }
    }

    /// Whether the open transaction carries uncommitted writes.
    pub async fn has_pending_writes(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|txn| txn.has_writes())
    }

    pub async fn read(&self, path: &str) -> Result<Option<ContentObject>> {
        let mut slot = self.current.lock().await;
        self.open(&mut slot).await?.read(path).await
    }

    pub async fn children(&self, path: &str) -> Result<Vec<ContentObject>> {
        let mut slot = self.current.lock().await;
        self.open(&mut slot).await?.children(path).await
    }

    pub async fn insert(&self, object: ContentObject) -> Result<ContentObject> {
        let mut slot = self.current.lock().await;
        self.open(&mut slot).await?.insert(object).await
    }

    pub async fn update(&self, object: ContentObject) -> Result<ContentObject> {
        let mut slot = self.current.lock().await;
        self.open(&mut slot).await?.update(object).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut slot = self.current.lock().await;
        self.open(&mut slot).await?.delete(path).await
    }

    async fn open<'a>(
        &self,
        slot: &'a mut Option<Box<dyn StoreTransaction>>,
    ) -> Result<&'a mut Box<dyn StoreTransaction>> {
        if slot.is_none() {
            *slot = Some(self.store.begin().await?);
        }
        slot.as_mut()
            .ok_or_else(|| Error::Internal("Transaction could not be opened".to_string()))
    }
}
