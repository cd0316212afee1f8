//! Prometheus metrics for the content server

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vellum_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "vellum_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    /// In-flight HTTP requests
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "vellum_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    // Batch Metrics

    /// Batch calls by commit mode and outcome
    pub static ref BATCH_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vellum_batch_calls_total",
        "Total number of @batch calls",
        &["mode", "outcome"]
    )
    .expect("Failed to register BATCH_CALLS_TOTAL");

    /// Items per batch call
    pub static ref BATCH_ITEMS: HistogramVec = register_histogram_vec!(
        "vellum_batch_items",
        "Number of items in a @batch call",
        &["mode"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]
    )
    .expect("Failed to register BATCH_ITEMS");

    /// Batch item results by commit mode and status class
    pub static ref BATCH_ITEM_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vellum_batch_item_results_total",
        "Total number of batch item results",
        &["mode", "status_class"]
    )
    .expect("Failed to register BATCH_ITEM_RESULTS_TOTAL");

    /// Write conflicts that triggered a retry
    pub static ref CONFLICT_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vellum_conflict_retries_total",
        "Total number of dispatch retries after a write conflict",
        &["method"]
    )
    .expect("Failed to register CONFLICT_RETRIES_TOTAL");
}

/// Replace content ids with a placeholder to keep label cardinality bounded.
///
/// Database and container segments are kept, views (`@name`) are kept,
/// any other segment becomes `{id}`.
pub fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut sanitized = String::new();
    for (i, segment) in segments.iter().enumerate() {
        sanitized.push('/');
        if i < 2 || segment.starts_with('@') || matches!(*segment, "health" | "metrics") {
            sanitized.push_str(segment);
        } else {
            sanitized.push_str("{id}");
        }
    }
    sanitized
}

/// Status class label ("2xx", "4xx", ...) for a numeric status.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/db/site"), "/db/site");
        assert_eq!(sanitize_path("/db/site/folder/item"), "/db/site/{id}/{id}");
        assert_eq!(sanitize_path("/db/site/@batch"), "/db/site/@batch");
        assert_eq!(
            sanitize_path("/db/site/item/@download/body"),
            "/db/site/{id}/@download/{id}"
        );
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/"), "/");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(201), "2xx");
        assert_eq!(status_class(409), "4xx");
        assert_eq!(status_class(500), "5xx");
    }
}
