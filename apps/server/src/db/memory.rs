//! In-memory content store with optimistic concurrency control

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{ContentStore, StoreTransaction};
use crate::{models::ContentObject, Error, Result};

/// Committed objects keyed by path.
#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, ContentObject>,
}

/// In-memory backend. Cloning shares the underlying data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    database_id: String,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn database_id(&self) -> &str {
        &self.database_id
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            writes: BTreeMap::new(),
        }))
    }
}

/// A buffered write and the committed version it expects to replace
/// (`None` = the path must still be free at commit).
#[derive(Debug, Clone)]
enum PendingWrite {
    Put {
        object: ContentObject,
        expected: Option<i64>,
    },
    Delete {
        expected: i64,
    },
}

impl PendingWrite {
    fn expected(&self) -> Option<i64> {
        match self {
            PendingWrite::Put { expected, .. } => *expected,
            PendingWrite::Delete { expected } => Some(*expected),
        }
    }
}

struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    writes: BTreeMap<String, PendingWrite>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn read(&mut self, path: &str) -> Result<Option<ContentObject>> {
        match self.writes.get(path) {
            Some(PendingWrite::Put { object, .. }) => Ok(Some(object.clone())),
            Some(PendingWrite::Delete { .. }) => Ok(None),
            None => Ok(self.state.read().await.objects.get(path).cloned()),
        }
    }

    async fn children(&mut self, path: &str) -> Result<Vec<ContentObject>> {
        let mut children: BTreeMap<String, ContentObject> = self
            .state
            .read()
            .await
            .objects
            .values()
            .filter(|obj| obj.parent_path.as_deref() == Some(path))
            .map(|obj| (obj.path.clone(), obj.clone()))
            .collect();

        for (write_path, write) in &self.writes {
            match write {
                PendingWrite::Put { object, .. } if object.parent_path.as_deref() == Some(path) => {
                    children.insert(write_path.clone(), object.clone());
                }
                PendingWrite::Delete { .. } => {
                    children.remove(write_path);
                }
                PendingWrite::Put { .. } => {}
            }
        }

        Ok(children.into_values().collect())
    }

    async fn insert(&mut self, mut object: ContentObject) -> Result<ContentObject> {
        let expected = match self.writes.get(&object.path) {
            Some(PendingWrite::Put { .. }) => {
                return Err(Error::DuplicateId(object.id.clone()));
            }
            // Re-creating a path deleted earlier in this transaction.
            Some(PendingWrite::Delete { expected }) => Some(*expected),
            None => {
                if self.state.read().await.objects.contains_key(&object.path) {
                    return Err(Error::DuplicateId(object.id.clone()));
                }
                None
            }
        };

        object.version = expected.unwrap_or(0);
        self.writes.insert(
            object.path.clone(),
            PendingWrite::Put {
                object: object.clone(),
                expected,
            },
        );
        Ok(object)
    }

    async fn update(&mut self, mut object: ContentObject) -> Result<ContentObject> {
        let expected = match self.writes.get(&object.path) {
            Some(PendingWrite::Put { expected, .. }) => *expected,
            Some(PendingWrite::Delete { .. }) => {
                return Err(Error::NotFound(object.path.clone()));
            }
            None => {
                if !self.state.read().await.objects.contains_key(&object.path) {
                    return Err(Error::NotFound(object.path.clone()));
                }
                // Validated against the committed version at commit time.
                Some(object.version)
            }
        };

        object.version = expected.unwrap_or(0);
        self.writes.insert(
            object.path.clone(),
            PendingWrite::Put {
                object: object.clone(),
                expected,
            },
        );
        Ok(object)
    }

    async fn delete(&mut self, path: &str) -> Result<()> {
        let prefix = format!("{}/", path);
        let in_subtree = |candidate: &str| candidate == path || candidate.starts_with(&prefix);

        let mut targets: BTreeMap<String, Option<i64>> = self
            .state
            .read()
            .await
            .objects
            .values()
            .filter(|obj| in_subtree(&obj.path))
            .map(|obj| (obj.path.clone(), Some(obj.version)))
            .collect();

        for (write_path, write) in &self.writes {
            if in_subtree(write_path) {
                match write {
                    PendingWrite::Put { expected, .. } => {
                        targets.insert(write_path.clone(), *expected);
                    }
                    PendingWrite::Delete { .. } => {
                        targets.remove(write_path);
                    }
                }
            }
        }

        if !targets.contains_key(path) {
            return Err(Error::NotFound(path.to_string()));
        }

        for (target, expected) in targets {
            match expected {
                Some(expected) => {
                    self.writes.insert(target, PendingWrite::Delete { expected });
                }
                // Created and deleted in this transaction: nothing to persist.
                None => {
                    self.writes.remove(&target);
                }
            }
        }

        Ok(())
    }

    fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { state, writes } = *self;
        if writes.is_empty() {
            return Ok(());
        }

        let mut state = state.write().await;

        for (path, write) in &writes {
            let committed = state.objects.get(path).map(|obj| obj.version);
            if committed != write.expected() {
                return Err(Error::WriteConflict(format!(
                    "{path} was modified by a concurrent transaction"
                )));
            }
        }

        for (path, write) in writes {
            match write {
                PendingWrite::Put {
                    mut object,
                    expected,
                } => {
                    object.version = expected.unwrap_or(0) + 1;
                    object.inherited.clear();
                    state.objects.insert(path, object);
                }
                PendingWrite::Delete { .. } => {
                    state.objects.remove(&path);
                }
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    async fn seeded() -> (MemoryStore, ContentObject) {
        let store = MemoryStore::new("db");
        let container = ContentObject::new(ContentType::Container, "site", None);
        let mut txn = store.begin().await.unwrap();
        let container = txn.insert(container).await.unwrap();
        txn.commit().await.unwrap();
        (store, container)
    }

    #[tokio::test]
    async fn test_reads_see_own_writes_only() {
        let (store, container) = seeded().await;
        let item = ContentObject::new(ContentType::Item, "a", Some(&container));

        let mut writer = store.begin().await.unwrap();
        writer.insert(item).await.unwrap();
        assert!(writer.read("/site/a").await.unwrap().is_some());
        assert_eq!(writer.children("/site").await.unwrap().len(), 1);

        let mut reader = store.begin().await.unwrap();
        assert!(reader.read("/site/a").await.unwrap().is_none());

        writer.commit().await.unwrap();
        let committed = reader.read("/site/a").await.unwrap().unwrap();
        assert_eq!(committed.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let (store, container) = seeded().await;
        let mut txn = store.begin().await.unwrap();
        txn.insert(ContentObject::new(ContentType::Item, "a", Some(&container)))
            .await
            .unwrap();
        let err = txn
            .insert(ContentObject::new(ContentType::Item, "a", Some(&container)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_at_commit() {
        let (store, _) = seeded().await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        let mut a = first.read("/site").await.unwrap().unwrap();
        let mut b = second.read("/site").await.unwrap().unwrap();

        a.title = Some("first".to_string());
        first.update(a).await.unwrap();
        first.commit().await.unwrap();

        b.title = Some("second".to_string());
        second.update(b).await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_write_conflict());

        let mut check = store.begin().await.unwrap();
        let site = check.read("/site").await.unwrap().unwrap();
        assert_eq!(site.title.as_deref(), Some("first"));
        assert_eq!(site.version, 2);
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let (store, container) = seeded().await;
        let folder = ContentObject::new(ContentType::Folder, "f", Some(&container));
        let item = ContentObject::new(ContentType::Item, "i", Some(&folder));

        let mut txn = store.begin().await.unwrap();
        txn.insert(folder).await.unwrap();
        txn.insert(item).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.delete("/site/f").await.unwrap();
        assert!(txn.read("/site/f/i").await.unwrap().is_none());
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        assert!(txn.read("/site/f").await.unwrap().is_none());
        assert!(txn.read("/site/f/i").await.unwrap().is_none());
        assert!(matches!(
            txn.delete("/site/f").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
