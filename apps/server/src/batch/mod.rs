//! `@batch` execution engine
//!
//! A batch call runs an ordered list of [`BatchItem`]s as sub-requests of the
//! outer request and answers with one [`ResultRecord`] per item, in order.
//!
//! - [`builder`] turns an item into an isolated [`ContentRequest`](crate::request::ContentRequest)
//!   sharing the outer transaction and principal
//! - [`executor`] traverses, checks permissions, invokes the view and normalizes
//!   its output, retrying on write conflicts
//! - [`commit`] decides between one shared transaction and per-item commits
//! - [`orchestrator`] drives the items in order

pub mod builder;
pub mod commit;
pub mod executor;
pub mod orchestrator;

pub use builder::RequestBuilder;
pub use commit::CommitStrategy;
pub use executor::{DispatchExecutor, RetryPolicy};
pub use orchestrator::BatchOrchestrator;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;

use crate::{views::ViewOutput, Error};

/// One client sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub method: String,
    #[serde(default)]
    pub endpoint: String,
    /// JSON value, or a string sent as the body verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub success: bool,
    pub body: JsonValue,
    pub status: u16,
    /// Media type of a streamed body; only used when rendering a top-level response.
    #[serde(skip)]
    pub media_type: Option<String>,
}

impl ResultRecord {
    fn failure(status: u16, reason: &str) -> Self {
        Self {
            success: false,
            body: json!({ "reason": reason }),
            status,
            media_type: None,
        }
    }

    /// Caller lacks the base access permission on the target.
    pub fn not_allowed() -> Self {
        Self::failure(401, "Not allowed")
    }

    /// No usable view for the target.
    pub fn not_found() -> Self {
        Self::failure(404, "Not found")
    }

    /// Caller lacks the view's own permission.
    pub fn no_view_access() -> Self {
        Self::failure(401, "No view access")
    }

    /// Normalize a view's return value.
    pub fn from_output(output: ViewOutput) -> Self {
        match output {
            ViewOutput::Response(response) => Self {
                success: !response.is_error,
                body: response.content,
                status: response.status.unwrap_or(200),
                media_type: None,
            },
            ViewOutput::Stream(stream) => Self {
                success: true,
                body: JsonValue::String(String::from_utf8_lossy(&stream.body).into_owned()),
                status: stream.status,
                media_type: Some(stream.content_type),
            },
            ViewOutput::Data(value) => Self {
                success: true,
                body: value,
                status: 200,
                media_type: None,
            },
        }
    }

    /// Error record for an item whose execution failed.
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            body: err.to_body("ViewError"),
            status: err.status().as_u16(),
            media_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{StreamResponse, ViewResponse};
    use axum::body::Bytes;

    #[test]
    fn test_batch_item_defaults() {
        let item: BatchItem = serde_json::from_value(json!({"method": "GET"})).unwrap();
        assert_eq!(item.endpoint, "");
        assert!(item.payload.is_none());
        assert!(item.headers.is_none());
    }

    #[test]
    fn test_normalize_response() {
        let record = ResultRecord::from_output(ViewOutput::Response(ViewResponse::created(
            json!({"@name": "x"}),
        )));
        assert!(record.success);
        assert_eq!(record.status, 201);
        assert_eq!(record.body["@name"], "x");

        let record = ResultRecord::from_output(ViewOutput::Response(ViewResponse {
            content: json!({"reason": "nope"}),
            status: None,
            is_error: true,
        }));
        assert!(!record.success);
        assert_eq!(record.status, 200);
    }

    #[test]
    fn test_normalize_stream_and_data() {
        let record = ResultRecord::from_output(ViewOutput::Stream(StreamResponse {
            status: 200,
            body: Bytes::from("héllo"),
            content_type: "text/plain".to_string(),
        }));
        assert_eq!(record.body, json!("héllo"));
        assert!(record.success);

        let record = ResultRecord::from_output(ViewOutput::Data(JsonValue::Null));
        assert_eq!(record.status, 200);
        assert_eq!(record.body, JsonValue::Null);
    }

    #[test]
    fn test_record_serialization_has_three_fields() {
        let value = serde_json::to_value(ResultRecord::not_found()).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "body": {"reason": "Not found"}, "status": 404})
        );
    }

    #[test]
    fn test_error_record() {
        let record = ResultRecord::from_error(&Error::DuplicateId("item".into()));
        assert_eq!(record.status, 409);
        assert!(!record.success);
        assert_eq!(record.body["error"]["type"], "ViewError");
    }
}
