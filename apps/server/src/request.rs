//! First-class content request
//!
//! [`ContentRequest`] is what traversal, permission checks and views read.
//! Top-level HTTP calls and batch sub-requests are both expressed as one,
//! so a sub-request needs no transport objects, only these fields.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::{
    auth::Principal,
    db::TransactionManager,
    layers::LayerTag,
    models::{container_relative, ContentObject},
    Error, Result,
};

/// Request body that can be read exactly once.
///
/// The first [`read_any`](Self::read_any) returns the whole payload, every
/// later read returns an empty chunk.
#[derive(Debug)]
pub struct SinglePayload {
    data: Bytes,
    consumed: AtomicBool,
}

impl SinglePayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            consumed: AtomicBool::new(false),
        }
    }

    pub fn read_any(&self) -> Bytes {
        if self.consumed.swap(true, Ordering::AcqRel) {
            Bytes::new()
        } else {
            self.data.clone()
        }
    }

    pub fn at_eof(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Make the payload readable again (a dispatch is being re-run).
    pub fn rewind(&self) {
        self.consumed.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
pub struct ContentRequest {
    pub method: Method,
    pub url: Url,
    /// Base URL of the container, used to resolve endpoints and build `@id`s.
    pub container_url: Url,
    /// Percent-encoded path segments below the container.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: SinglePayload,
    /// Borrowed from the call that created this request.
    pub txn: Arc<TransactionManager>,
    pub db_id: String,
    pub container: Option<ContentObject>,
    pub container_settings: JsonMap<String, JsonValue>,
    pub layers: Vec<LayerTag>,
    pub principal: Principal,
    pub request_id: Option<String>,
}

impl ContentRequest {
    /// Request for `url`, which must lie below `container_url`.
    pub fn new(
        method: Method,
        url: Url,
        container_url: Url,
        headers: HeaderMap,
        body: impl Into<Bytes>,
        txn: Arc<TransactionManager>,
        principal: Principal,
    ) -> Result<Self> {
        let segments = container_segments(&container_url, &url)?;
        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            method,
            db_id: txn.database_id().to_string(),
            url,
            container_url,
            segments,
            query,
            headers,
            body: SinglePayload::new(body),
            txn,
            container: None,
            container_settings: JsonMap::new(),
            layers: Vec::new(),
            principal,
            request_id: None,
        })
    }

    /// Bind the container and its registry settings.
    pub fn with_container(mut self, container: ContentObject, layers: Vec<LayerTag>) -> Self {
        self.container_settings = container.registry.clone();
        self.container = Some(container);
        self.layers = layers;
        self
    }

    pub fn container(&self) -> Result<&ContentObject> {
        self.container
            .as_ref()
            .ok_or_else(|| Error::Configuration("Request has no container".to_string()))
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Read the body as JSON. An empty (or already consumed) body reads as `{}`.
    pub fn json(&self) -> Result<JsonValue> {
        let data = self.body.read_any();
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonValue::Object(JsonMap::new()));
        }
        serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidRequest(format!("Invalid JSON body: {e}")))
    }

    /// Absolute URL of an object of this request's container.
    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.container_url.as_str().trim_end_matches('/');
        match container_relative(path) {
            "" => base.to_string(),
            relative => format!("{base}/{relative}"),
        }
    }

    pub fn url_for(&self, object: &ContentObject) -> String {
        self.url_for_path(&object.path)
    }
}

/// Join `endpoint` onto a container URL; an empty endpoint is the container itself.
pub fn resolve_endpoint(container_url: &Url, endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() {
        return Ok(container_url.clone());
    }

    let mut base = container_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(endpoint)
        .map_err(|e| Error::InvalidRequest(format!("Invalid endpoint '{endpoint}': {e}")))
}

fn container_segments(container_url: &Url, url: &Url) -> Result<Vec<String>> {
    let base = container_url.path().trim_end_matches('/');
    let path = url.path();

    let rest = match path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => {
            return Err(Error::InvalidRequest(format!(
                "'{path}' is outside the container"
            )))
        }
    };

    Ok(rest
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect())
}
