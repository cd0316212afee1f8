//! URL helpers for building absolute object URLs.

use axum::http::{HeaderMap, Uri};
use url::Url;

use crate::{Error, Result};

/// `{scheme}://{host}` using forwarding headers when present.
pub fn base_url_from_headers(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .or_else(|| headers.get("x-forwarded-scheme"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

/// Absolute URL of the container `/{db}/{container}`.
pub fn container_url(headers: &HeaderMap, db: &str, container: &str) -> Result<Url> {
    let raw = format!(
        "{}/{}/{}",
        base_url_from_headers(headers),
        urlencoding::encode(db),
        urlencoding::encode(container)
    );
    Url::parse(&raw).map_err(|e| Error::InvalidRequest(format!("Invalid container URL: {e}")))
}

/// Absolute URL of the incoming request.
pub fn request_url(headers: &HeaderMap, uri: &Uri) -> Result<Url> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let raw = format!("{}{}", base_url_from_headers(headers), path_and_query);
    Url::parse(&raw).map_err(|e| Error::InvalidRequest(format!("Invalid request URL: {e}")))
}
