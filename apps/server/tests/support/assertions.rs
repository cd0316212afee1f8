use anyhow::Context as _;
use axum::http::StatusCode;
use serde_json::Value;

/// Assert a specific HTTP status code
pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "{context}: expected status {expected}, got {actual}"
    );
}

/// Result records of a batch response body
pub fn batch_records(body: &[u8]) -> anyhow::Result<Vec<Value>> {
    let value: Value = serde_json::from_slice(body).context("batch response is JSON")?;
    value
        .as_array()
        .cloned()
        .context("batch response is an array")
}

/// Status of every record, in order
pub fn record_statuses(records: &[Value]) -> Vec<u64> {
    records
        .iter()
        .map(|record| record["status"].as_u64().unwrap_or_default())
        .collect()
}

/// Assert one record's status and success flag
pub fn assert_record(record: &Value, status: u64, success: bool, context: &str) {
    assert_eq!(
        record["status"].as_u64(),
        Some(status),
        "{context}: unexpected status in {record}"
    );
    assert_eq!(
        record["success"].as_bool(),
        Some(success),
        "{context}: unexpected success flag in {record}"
    );
}
