//! Path traversal over the content tree

use async_trait::async_trait;

use crate::{
    models::{child_path, ContentObject, InheritedAcl},
    request::ContentRequest,
    Error, Result,
};

/// Resolves path segments below a container to an object plus the unmatched tail.
#[async_trait]
pub trait Traverser: Send + Sync {
    async fn traverse(
        &self,
        request: &ContentRequest,
        container: &ContentObject,
        segments: &[String],
    ) -> Result<(ContentObject, Vec<String>)>;
}

/// Walks child ids through the request's transaction.
///
/// Traversal stops at the first segment that names a view (`@...`), at a
/// non-folderish object, or at an id with no matching child; the remaining
/// segments become the tail.
#[derive(Debug, Clone, Default)]
pub struct StoreTraverser;

#[async_trait]
impl Traverser for StoreTraverser {
    async fn traverse(
        &self,
        request: &ContentRequest,
        container: &ContentObject,
        segments: &[String],
    ) -> Result<(ContentObject, Vec<String>)> {
        // Earlier commits on this transaction manager may have moved the container on,
        // or an earlier write in the same transaction removed it.
        let Some(mut current) = request.txn.read(&container.path).await? else {
            return Err(Error::NotFound(format!("Container '{}'", container.path)));
        };
        current.inherited = container.inherited.clone();

        let mut consumed = 0;
        for segment in segments {
            if segment.starts_with('@') || !current.is_folderish() {
                break;
            }

            let id = urlencoding::decode(segment)
                .map(|id| id.into_owned())
                .unwrap_or_else(|_| segment.clone());

            let Some(mut child) = request.txn.read(&child_path(&current.path, &id)).await? else {
                break;
            };

            child.inherited = Vec::with_capacity(current.inherited.len() + 1);
            child.inherited.push(InheritedAcl {
                path: current.path.clone(),
                acl: current.acl.clone(),
            });
            child.inherited.extend(current.inherited.iter().cloned());

            current = child;
            consumed += 1;
        }

        Ok((current, segments[consumed..].to_vec()))
    }
}
