//! Per-request context injected by middleware.

/// Identifier assigned to the HTTP request by `request_id_middleware`;
/// sub-requests of a batch inherit it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}
