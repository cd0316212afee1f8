//! Commit strategy for a batch call

use std::fmt;

use super::ResultRecord;
use crate::{db::TransactionManager, Result};

/// Query parameter selecting the strategy.
pub const EAGER_COMMIT_PARAM: &str = "eager-commit";

/// When sub-request writes become durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitStrategy {
    /// All items share the outer transaction; the HTTP layer commits once at the end.
    /// An item error aborts the whole batch.
    #[default]
    Shared,
    /// Each item commits right after its view succeeds. An item error aborts only
    /// that item's work and becomes an error record.
    Eager,
}

impl CommitStrategy {
    /// `eager-commit=true` (case-insensitive) selects [`CommitStrategy::Eager`].
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.eq_ignore_ascii_case("true") => CommitStrategy::Eager,
            _ => CommitStrategy::Shared,
        }
    }

    pub fn is_eager(&self) -> bool {
        matches!(self, CommitStrategy::Eager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStrategy::Shared => "shared",
            CommitStrategy::Eager => "eager",
        }
    }

    /// Apply the strategy to the outcome of one item.
    pub async fn settle(
        &self,
        outcome: Result<ResultRecord>,
        txn: &TransactionManager,
    ) -> Result<ResultRecord> {
        let err = match outcome {
            Ok(record) => return Ok(record),
            Err(err) => err,
        };

        match self {
            CommitStrategy::Shared => Err(err),
            CommitStrategy::Eager => {
                if err.status().is_server_error() {
                    tracing::error!(error = %err, "Batch item failed");
                } else {
                    tracing::debug!(error = %err, "Batch item rejected");
                }

                if let Err(abort_err) = txn.abort().await {
                    tracing::warn!(error = %abort_err, "Failed to abort batch item transaction");
                }

                Ok(ResultRecord::from_error(&err))
            }
        }
    }
}

impl fmt::Display for CommitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
