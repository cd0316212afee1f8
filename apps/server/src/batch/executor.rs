//! Dispatch of one request through traversal, permissions and view lookup

use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;

use super::{CommitStrategy, ResultRecord};
use crate::{
    auth::Principal,
    config::BatchConfig,
    models::ContentObject,
    request::ContentRequest,
    security::{permissions, PermissionChecker},
    traversal::Traverser,
    views::{path_to_view_name, ViewContext, ViewRegistry},
    Error, Result,
};

/// Methods that can be dispatched to views.
fn is_dispatchable(method: &Method) -> bool {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
    ]
    .contains(method)
}

/// Constant-backoff retry on write conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for RetryPolicy {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.conflict_max_attempts.max(1),
            backoff: Duration::from_millis(config.conflict_backoff_ms),
        }
    }
}

pub struct DispatchExecutor {
    traverser: Arc<dyn Traverser>,
    views: Arc<ViewRegistry>,
    checker: Arc<dyn PermissionChecker>,
    retry: RetryPolicy,
}

impl DispatchExecutor {
    pub fn new(
        traverser: Arc<dyn Traverser>,
        views: Arc<ViewRegistry>,
        checker: Arc<dyn PermissionChecker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            traverser,
            views,
            checker,
            retry,
        }
    }

    /// Dispatch `request` below `container` on behalf of `security`.
    ///
    /// Permission and lookup failures come back as records. A write conflict
    /// aborts the transaction and re-runs the whole dispatch, up to
    /// `max_attempts` in total. Under [`CommitStrategy::Shared`] a retry is only
    /// made when the shared transaction held no writes before this request,
    /// since aborting would discard earlier items' work; otherwise the conflict
    /// propagates at once.
    pub async fn execute(
        &self,
        request: &ContentRequest,
        container: &ContentObject,
        security: &Principal,
        strategy: CommitStrategy,
    ) -> Result<ResultRecord> {
        let can_retry = strategy.is_eager() || !request.txn.has_pending_writes().await;

        let mut attempt = 1;
        loop {
            request.body.rewind();

            match self.dispatch(request, container, security, strategy).await {
                Err(err)
                    if err.is_write_conflict()
                        && can_retry
                        && attempt < self.retry.max_attempts =>
                {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        method = %request.method,
                        url = %request.url,
                        error = %err,
                        "Write conflict, retrying"
                    );
                    crate::metrics::CONFLICT_RETRIES_TOTAL
                        .with_label_values(&[request.method.as_str()])
                        .inc();

                    request.txn.abort().await?;
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ContentRequest,
        container: &ContentObject,
        security: &Principal,
        strategy: CommitStrategy,
    ) -> Result<ResultRecord> {
        if !is_dispatchable(&request.method) {
            return Err(Error::MethodNotAllowed(request.method.to_string()));
        }

        let (object, tail) = match self
            .traverser
            .traverse(request, container, &request.segments)
            .await
        {
            Ok(found) => found,
            Err(Error::NotFound(what)) => {
                tracing::debug!(%what, url = %request.url, "Traversal found nothing");
                return Ok(ResultRecord::not_found());
            }
            Err(err) => return Err(err),
        };

        let view_name = if tail.is_empty() {
            String::new()
        } else {
            path_to_view_name(&tail)
        };

        if !self
            .checker
            .check_permission(security, permissions::ACCESS_CONTENT, &object)
        {
            return Ok(ResultRecord::not_allowed());
        }

        let Some(resolved) = self.views.try_resolve_view(
            &request.method,
            &view_name,
            &object,
            &request.layers,
            &tail,
        ) else {
            tracing::debug!(view = %view_name, path = %object.path, "No view found");
            return Ok(ResultRecord::not_found());
        };

        if !self
            .checker
            .check_permission(security, resolved.permission, &object)
        {
            return Ok(ResultRecord::no_view_access());
        }

        let ctx = ViewContext {
            request,
            context: object,
            matchdict: resolved.matchdict,
            principal: security,
            checker: self.checker.as_ref(),
        };

        let view = match resolved.view.prepare(&ctx).await? {
            Some(replacement) => replacement,
            None => resolved.view,
        };

        let output = view.call(&ctx).await?;

        if strategy.is_eager() {
            request.txn.commit().await?;
        }

        Ok(ResultRecord::from_output(output))
    }
}
