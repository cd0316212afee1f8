//! Capability layers
//!
//! A container lists the layers active for it under [`ACTIVE_LAYERS_KEY`] in
//! its registry. Only layers installed in this deployment (configuration key
//! `layers.installed`) resolve to a [`LayerTag`]; views can be bound to a tag
//! so they are only reachable on containers that activated it.

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::LayersConfig;

/// Registry key holding the list of active layer names.
pub const ACTIVE_LAYERS_KEY: &str = "vellum.layers.active";

/// Resolved capability marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerTag(Arc<str>);

impl LayerTag {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Layers installed in this deployment, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    installed: HashMap<String, LayerTag>,
}

impl LayerRegistry {
    pub fn from_config(config: &LayersConfig) -> Self {
        let installed = config
            .installed
            .iter()
            .map(|name| (name.clone(), LayerTag::new(name)))
            .collect();
        Self { installed }
    }

    pub fn resolve(&self, name: &str) -> Option<LayerTag> {
        self.installed.get(name).cloned()
    }

    /// Tags for the layers listed in a container registry.
    ///
    /// Names that are not installed here are skipped.
    pub fn active_layers(&self, settings: &JsonMap<String, JsonValue>) -> Vec<LayerTag> {
        let Some(JsonValue::Array(names)) = settings.get(ACTIVE_LAYERS_KEY) else {
            return Vec::new();
        };

        let mut layers = Vec::with_capacity(names.len());
        for name in names.iter().filter_map(JsonValue::as_str) {
            match self.resolve(name) {
                Some(tag) => {
                    if !layers.contains(&tag) {
                        layers.push(tag);
                    }
                }
                None => tracing::debug!(layer = name, "Skipping layer that is not installed"),
            }
        }
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_layers_are_skipped() {
        let registry = LayerRegistry::from_config(&LayersConfig {
            installed: vec!["vellum.layers.Greeting".to_string()],
        });

        let mut settings = JsonMap::new();
        settings.insert(
            ACTIVE_LAYERS_KEY.to_string(),
            json!(["vellum.layers.Greeting", "missing.Layer", 42]),
        );
        let layers = registry.active_layers(&settings);

        assert_eq!(layers, vec![LayerTag::new("vellum.layers.Greeting")]);
    }

    #[test]
    fn test_no_active_layers() {
        let registry = LayerRegistry::default();
        assert!(registry.active_layers(&JsonMap::new()).is_empty());
    }
}
