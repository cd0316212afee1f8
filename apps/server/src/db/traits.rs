//! Core traits for content storage backends

use async_trait::async_trait;

use crate::{models::ContentObject, Result};

/// A storage backend for one database.
///
/// Any backend (in-memory, PostgreSQL, ...) that can hand out optimistic
/// transactions over content objects can implement this trait.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// The database id this store serves (the `{db}` URL segment).
    fn database_id(&self) -> &str;

    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Transaction over content objects.
///
/// Dropping an unfinished transaction discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read the current state of the object at `path`, including this transaction's writes.
    ///
    /// # Returns
    /// * `Ok(Some(object))` - object exists
    /// * `Ok(None)` - no object at that path (or deleted in this transaction)
    async fn read(&mut self, path: &str) -> Result<Option<ContentObject>>;

    /// Direct children of the object at `path`, ordered by path.
    async fn children(&mut self, path: &str) -> Result<Vec<ContentObject>>;

    /// Store a new object.
    ///
    /// # Errors
    /// * `DuplicateId` - an object already exists at the object's path
    async fn insert(&mut self, object: ContentObject) -> Result<ContentObject>;

    /// Store a modified copy of an existing object.
    ///
    /// The copy's `version` is the version it was read at; a backend reports
    /// `WriteConflict` (now or at commit) when the stored version has moved on.
    ///
    /// # Errors
    /// * `NotFound` - the object does not exist
    /// * `WriteConflict` - the copy is stale
    async fn update(&mut self, object: ContentObject) -> Result<ContentObject>;

    /// Delete the object at `path` together with its descendants.
    async fn delete(&mut self, path: &str) -> Result<()>;

    /// Whether this transaction has performed any write.
    fn has_writes(&self) -> bool;

    /// Commit the transaction
    ///
    /// # Errors
    /// * `WriteConflict` - a concurrent commit touched the same objects
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
