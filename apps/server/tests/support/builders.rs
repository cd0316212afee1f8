use axum::body::Bytes;
use serde_json::{json, Value};

/// Convert JSON value to request body bytes
pub fn to_json_body(value: &Value) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Builder for `@batch` request bodies
#[derive(Default)]
pub struct BatchBuilder {
    items: Vec<Value>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(self, endpoint: &str) -> Self {
        self.item(json!({ "method": "GET", "endpoint": endpoint }))
    }

    pub fn post(self, endpoint: &str, payload: Value) -> Self {
        self.item(json!({ "method": "POST", "endpoint": endpoint, "payload": payload }))
    }

    pub fn patch(self, endpoint: &str, payload: Value) -> Self {
        self.item(json!({ "method": "PATCH", "endpoint": endpoint, "payload": payload }))
    }

    pub fn delete(self, endpoint: &str) -> Self {
        self.item(json!({ "method": "DELETE", "endpoint": endpoint }))
    }

    pub fn item(mut self, item: Value) -> Self {
        self.items.push(item);
        self
    }

    pub fn build(self) -> Value {
        Value::Array(self.items)
    }
}
