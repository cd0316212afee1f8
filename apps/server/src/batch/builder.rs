//! Builds the isolated sub-request for one batch item

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use super::BatchItem;
use crate::{
    layers::LayerRegistry,
    request::{resolve_endpoint, ContentRequest},
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    layers: Arc<LayerRegistry>,
}

impl RequestBuilder {
    pub fn new(layers: Arc<LayerRegistry>) -> Self {
        Self { layers }
    }

    /// Sub-request for `item`: own method, URL, headers and body; the outer
    /// request's transaction, database and principal.
    ///
    /// # Errors
    /// * `Configuration` - the outer request has no container
    pub async fn build(&self, outer: &ContentRequest, item: &BatchItem) -> Result<ContentRequest> {
        let container = outer.container()?;

        let method = parse_method(&item.method)?;
        let url = resolve_endpoint(&outer.container_url, &item.endpoint)?;
        let body = encode_payload(item.payload.as_ref())?;
        let headers = merge_headers(&outer.headers, item.headers.as_ref(), body.len())?;

        let mut request = ContentRequest::new(
            method,
            url,
            outer.container_url.clone(),
            headers,
            body,
            Arc::clone(&outer.txn),
            outer.principal.clone(),
        )?;
        request.request_id = outer.request_id.clone();

        // Layer markers come from the persisted registry, not from the outer request.
        // A container removed earlier in the transaction stays unbound; traversal
        // reports it as not found.
        match outer.txn.read(&container.path).await? {
            Some(current) => {
                let layers = self.layers.active_layers(&current.registry);
                Ok(request.with_container(current, layers))
            }
            None => Ok(request),
        }
    }
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::MethodNotAllowed(method.to_string()))
}

/// JSON text for the sub-request body; strings are sent verbatim, absent payloads as `{}`.
pub fn encode_payload(payload: Option<&JsonValue>) -> Result<Vec<u8>> {
    match payload {
        None | Some(JsonValue::Null) => Ok(b"{}".to_vec()),
        Some(JsonValue::String(text)) if text.is_empty() => Ok(b"{}".to_vec()),
        Some(JsonValue::String(text)) => Ok(text.as_bytes().to_vec()),
        Some(value) => serde_json::to_vec(value)
            .map_err(|e| Error::InvalidRequest(format!("Cannot encode payload: {e}"))),
    }
}

/// Outer headers overridden by the item's headers (names compared case-insensitively).
pub fn merge_headers(
    outer: &HeaderMap,
    overrides: Option<&HashMap<String, String>>,
    body_len: usize,
) -> Result<HeaderMap> {
    let mut headers = outer.clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));

    for (name, value) in overrides.into_iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("Invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidRequest(format!("Invalid value for header '{name}'")))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::db::{MemoryStore, TransactionManager};
    use crate::layers::{LayerTag, ACTIVE_LAYERS_KEY};
    use crate::models::{ContentObject, ContentType};
    use crate::config::LayersConfig;
    use serde_json::json;
    use url::Url;

    #[test]
    fn test_encode_payload() {
        assert_eq!(encode_payload(None).unwrap(), b"{}");
        assert_eq!(encode_payload(Some(&JsonValue::Null)).unwrap(), b"{}");
        assert_eq!(
            encode_payload(Some(&json!("raw text"))).unwrap(),
            b"raw text"
        );
        assert_eq!(
            encode_payload(Some(&json!({"title": "x"}))).unwrap(),
            br#"{"title":"x"}"#
        );
    }

    #[test]
    fn test_merge_headers_item_wins() {
        let mut outer = HeaderMap::new();
        outer.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        outer.insert("x-custom", HeaderValue::from_static("outer"));
        outer.insert(header::CONTENT_LENGTH, HeaderValue::from(999));

        let mut overrides = HashMap::new();
        overrides.insert("X-Custom".to_string(), "item".to_string());

        let merged = merge_headers(&outer, Some(&overrides), 2).unwrap();
        assert_eq!(merged.get("x-custom").unwrap(), "item");
        assert_eq!(merged.get(header::ACCEPT).unwrap(), "application/json");
        assert_eq!(merged.get(header::CONTENT_LENGTH).unwrap(), "2");
        assert_eq!(merged.get_all("x-custom").iter().count(), 1);
    }

    #[test]
    fn test_merge_headers_rejects_invalid_name() {
        let mut overrides = HashMap::new();
        overrides.insert("bad header".to_string(), "x".to_string());
        assert!(merge_headers(&HeaderMap::new(), Some(&overrides), 0).is_err());
    }

    fn outer_request(txn: Arc<TransactionManager>) -> ContentRequest {
        let base = Url::parse("http://localhost/db/site").unwrap();
        let url = Url::parse("http://localhost/db/site/@batch").unwrap();
        ContentRequest::new(
            Method::POST,
            url,
            base,
            HeaderMap::new(),
            "[]",
            txn,
            Principal::root("root"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_requires_container() {
        let txn = Arc::new(TransactionManager::new(Arc::new(MemoryStore::new("db"))));
        let builder = RequestBuilder::new(Arc::new(LayerRegistry::default()));
        let item = BatchItem {
            method: "GET".to_string(),
            endpoint: "a".to_string(),
            payload: None,
            headers: None,
        };

        let err = builder.build(&outer_request(txn), &item).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_build_shares_context_and_reapplies_layers() {
        let txn = Arc::new(TransactionManager::new(Arc::new(MemoryStore::new("db"))));
        let mut container = ContentObject::new(ContentType::Container, "site", None);
        container.registry.insert(
            ACTIVE_LAYERS_KEY.to_string(),
            json!(["vellum.layers.Greeting", "not.installed"]),
        );
        let container = txn.insert(container).await.unwrap();

        let outer = outer_request(Arc::clone(&txn)).with_container(container, Vec::new());
        let layers = LayerRegistry::from_config(&LayersConfig {
            installed: vec!["vellum.layers.Greeting".to_string()],
        });
        let builder = RequestBuilder::new(Arc::new(layers));

        let item = BatchItem {
            method: "patch".to_string(),
            endpoint: "folder/item?x=1".to_string(),
            payload: Some(json!({"title": "changed"})),
            headers: None,
        };
        let request = builder.build(&outer, &item).await.unwrap();

        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.segments, vec!["folder", "item"]);
        assert_eq!(request.query_param("x"), Some("1"));
        assert!(Arc::ptr_eq(&request.txn, &outer.txn));
        assert_eq!(request.principal, outer.principal);
        assert_eq!(request.layers, vec![LayerTag::new("vellum.layers.Greeting")]);
        assert_eq!(request.json().unwrap(), json!({"title": "changed"}));
        assert!(request.body.at_eof());
    }
}
