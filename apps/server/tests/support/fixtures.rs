use serde_json::{json, Value};

pub mod constants {
    pub const DB: &str = "db";
    pub const CONTAINER: &str = "site";
    pub const JWT_SECRET: &str = "test-secret";
    pub const GREETING_LAYER: &str = "vellum.layers.Greeting";
}

pub fn container_payload(id: &str) -> Value {
    json!({ "@type": "Container", "id": id, "title": "Test site" })
}

pub fn folder(id: &str) -> Value {
    json!({ "@type": "Folder", "id": id, "title": format!("Folder {id}") })
}

pub fn item(id: &str) -> Value {
    json!({ "@type": "Item", "id": id, "title": format!("Item {id}") })
}
