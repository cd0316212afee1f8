//! `@batch` handler

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value as JsonValue;

use crate::{
    batch::{commit::EAGER_COMMIT_PARAM, BatchItem, CommitStrategy},
    request::ContentRequest,
    security::permissions,
    state::AppState,
    Error, Result,
};

/// Run a batch call on behalf of `request` (the outer request, bound to its container).
///
/// Item failures are reported inside the result list. The outer transaction is
/// committed once all items ran, or aborted when the batch fails as a whole.
pub async fn run_batch(state: &AppState, request: ContentRequest) -> Result<Response> {
    let container = request.container()?;
    if !state
        .checker
        .check_permission(&request.principal, permissions::ACCESS_CONTENT, container)
    {
        return Err(Error::Unauthorized("Not allowed".to_string()));
    }

    let items = parse_items(&request.body.read_any(), state.config.batch.max_items)?;
    let strategy = CommitStrategy::from_query(request.query_param(EAGER_COMMIT_PARAM));

    tracing::info!(items = items.len(), mode = %strategy, "Running batch");
    crate::metrics::BATCH_ITEMS
        .with_label_values(&[strategy.as_str()])
        .observe(items.len() as f64);

    let outcome = match state.batch.run(&request, &items, strategy).await {
        Ok(results) => request.txn.commit().await.map(|_| results),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(results) => {
            crate::metrics::BATCH_CALLS_TOTAL
                .with_label_values(&[strategy.as_str(), "ok"])
                .inc();
            Ok(Json(results).into_response())
        }
        Err(err) => {
            crate::metrics::BATCH_CALLS_TOTAL
                .with_label_values(&[strategy.as_str(), "aborted"])
                .inc();
            tracing::warn!(error = %err, mode = %strategy, "Batch aborted");

            if let Err(abort_err) = request.txn.abort().await {
                tracing::warn!(error = %abort_err, "Failed to abort batch transaction");
            }
            Err(err)
        }
    }
}

/// Decode the batch body: a JSON array of items, at most `max_items` long.
pub fn parse_items(body: &[u8], max_items: usize) -> Result<Vec<BatchItem>> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidRequest(format!("Batch body is not valid JSON: {e}")))?;

    let JsonValue::Array(entries) = value else {
        return Err(Error::InvalidRequest(
            "Batch body must be a JSON array".to_string(),
        ));
    };

    if entries.len() > max_items {
        return Err(Error::InvalidRequest(format!(
            "Batch has {} items, the limit is {max_items}",
            entries.len()
        )));
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry)
                .map_err(|e| Error::InvalidRequest(format!("Invalid batch item {index}: {e}")))
        })
        .collect()
}
