//! Runs the items of a batch call in order

use std::sync::Arc;
use tracing::Instrument;

use super::{BatchItem, CommitStrategy, DispatchExecutor, RequestBuilder, ResultRecord};
use crate::{request::ContentRequest, Result};

pub struct BatchOrchestrator {
    builder: RequestBuilder,
    executor: Arc<DispatchExecutor>,
}

impl BatchOrchestrator {
    pub fn new(builder: RequestBuilder, executor: Arc<DispatchExecutor>) -> Self {
        Self { builder, executor }
    }

    /// Execute `items` sequentially and return one record per item, in order.
    ///
    /// # Errors
    /// * `Configuration` - the outer request has no container; no item runs
    /// * any item error under [`CommitStrategy::Shared`]
    pub async fn run(
        &self,
        outer: &ContentRequest,
        items: &[BatchItem],
        strategy: CommitStrategy,
    ) -> Result<Vec<ResultRecord>> {
        let container = outer.container()?.clone();

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let span = tracing::info_span!(
                "batch_item",
                index,
                method = %item.method,
                endpoint = %item.endpoint,
                mode = strategy.as_str(),
            );

            let record = async {
                let outcome = async {
                    let request = self.builder.build(outer, item).await?;
                    self.executor
                        .execute(&request, &container, &outer.principal, strategy)
                        .await
                }
                .await;

                strategy.settle(outcome, &outer.txn).await
            }
            .instrument(span)
            .await?;

            crate::metrics::BATCH_ITEM_RESULTS_TOTAL
                .with_label_values(&[
                    strategy.as_str(),
                    crate::metrics::status_class(record.status),
                ])
                .inc();

            tracing::debug!(
                index,
                status = record.status,
                success = record.success,
                "Batch item done"
            );
            results.push(record);
        }

        Ok(results)
    }
}
