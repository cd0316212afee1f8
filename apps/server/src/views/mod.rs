//! Views: route patterns, registrations and lookup
//!
//! A view is addressed by HTTP method plus a view name derived from the tail
//! left over by traversal (`""` for the object itself, `@sharing`,
//! `@download/{}` ...). [`ViewRegistry::try_resolve_view`] returns `None`
//! when nothing usable matches.

pub mod content;
pub mod sharing;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::Method;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    auth::Principal,
    layers::LayerTag,
    models::ContentObject,
    request::ContentRequest,
    security::PermissionChecker,
    Error, Result,
};

/// Everything a view invocation can see.
pub struct ViewContext<'a> {
    pub request: &'a ContentRequest,
    /// The traversed object.
    pub context: ContentObject,
    /// Values captured by the route's `{param}` segments.
    pub matchdict: HashMap<String, String>,
    /// Identity of the call the view runs for.
    pub principal: &'a Principal,
    pub checker: &'a dyn PermissionChecker,
}

impl ViewContext<'_> {
    pub fn check_permission(&self, permission: &str, object: &ContentObject) -> bool {
        self.checker
            .check_permission(self.principal, permission, object)
    }

    pub fn param(&self, name: &str) -> Result<&str> {
        self.matchdict
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::Internal(format!("Route parameter '{name}' was not captured")))
    }
}

/// HTTP-response-like view result.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResponse {
    pub content: JsonValue,
    /// `None` means 200.
    pub status: Option<u16>,
    pub is_error: bool,
}

impl ViewResponse {
    pub fn ok(content: JsonValue) -> Self {
        Self {
            content,
            status: Some(200),
            is_error: false,
        }
    }

    pub fn created(content: JsonValue) -> Self {
        Self {
            content,
            status: Some(201),
            is_error: false,
        }
    }

    pub fn no_content() -> Self {
        Self {
            content: JsonValue::Null,
            status: Some(204),
            is_error: false,
        }
    }

    pub fn error(status: u16, content: JsonValue) -> Self {
        Self {
            content,
            status: Some(status),
            is_error: true,
        }
    }
}

/// Buffered streaming result.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutput {
    Response(ViewResponse),
    Stream(StreamResponse),
    /// Plain data, rendered as JSON with status 200.
    Data(JsonValue),
}

impl From<ViewResponse> for ViewOutput {
    fn from(response: ViewResponse) -> Self {
        ViewOutput::Response(response)
    }
}

impl From<JsonValue> for ViewOutput {
    fn from(value: JsonValue) -> Self {
        ViewOutput::Data(value)
    }
}

#[async_trait]
pub trait View: Send + Sync {
    /// Optional preparation step; may hand back a different view to invoke.
    async fn prepare(&self, _ctx: &ViewContext<'_>) -> Result<Option<Arc<dyn View>>> {
        Ok(None)
    }

    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RouteSegment {
    Literal(String),
    Param(String),
}

/// Route pattern such as `@download/{field}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pattern: String,
    segments: Vec<RouteSegment>,
}

impl Route {
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => RouteSegment::Param(name.to_string()),
                None => RouteSegment::Literal(s.to_string()),
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Name the route is registered under; same convention as [`path_to_view_name`].
    pub fn view_name(&self) -> String {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|segment| match segment {
                RouteSegment::Literal(s) | RouteSegment::Param(s) => s.as_str(),
            })
            .collect();
        path_to_view_name(&parts)
    }

    /// Match a traversal tail, returning the captured parameters.
    pub fn matches<S: AsRef<str>>(&self, tail: &[S]) -> Option<HashMap<String, String>> {
        if tail.len() != self.segments.len() {
            return None;
        }

        let mut matchdict = HashMap::new();
        for (segment, part) in self.segments.iter().zip(tail) {
            let part = part.as_ref();
            match segment {
                RouteSegment::Literal(literal) if literal == part => {}
                RouteSegment::Literal(_) => return None,
                RouteSegment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    matchdict.insert(name.clone(), value);
                }
            }
        }
        Some(matchdict)
    }
}

/// View name for a traversal tail: the first segment, then `{}` per further segment.
pub fn path_to_view_name<S: AsRef<str>>(tail: &[S]) -> String {
    let Some((first, rest)) = tail.split_first() else {
        return String::new();
    };

    let mut name = first.as_ref().to_string();
    for _ in rest {
        name.push_str("/{}");
    }
    name
}

/// Which objects a registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextFilter {
    Any,
    Folderish,
    Container,
}

impl ContextFilter {
    fn accepts(&self, object: &ContentObject) -> bool {
        match self {
            ContextFilter::Any => true,
            ContextFilter::Folderish => object.is_folderish(),
            ContextFilter::Container => object.type_name == crate::models::ContentType::Container,
        }
    }
}

#[derive(Clone)]
pub struct ViewRegistration {
    pub method: Method,
    pub route: Route,
    pub context: ContextFilter,
    pub layer: Option<LayerTag>,
    pub permission: &'static str,
    pub view: Arc<dyn View>,
}

impl ViewRegistration {
    pub fn new(method: Method, route: &str, permission: &'static str, view: Arc<dyn View>) -> Self {
        Self {
            method,
            route: Route::new(route),
            context: ContextFilter::Any,
            layer: None,
            permission,
            view,
        }
    }

    pub fn for_context(mut self, context: ContextFilter) -> Self {
        self.context = context;
        self
    }

    pub fn for_layer(mut self, layer: LayerTag) -> Self {
        self.layer = Some(layer);
        self
    }
}

/// A view that matched method, name, context, layers and route.
pub struct ResolvedView {
    pub view: Arc<dyn View>,
    pub permission: &'static str,
    pub matchdict: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct ViewRegistry {
    views: HashMap<(Method, String), Vec<ViewRegistration>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in content, sharing and registry views.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        content::register(&mut registry);
        sharing::register(&mut registry);
        registry
    }

    pub fn register(&mut self, registration: ViewRegistration) {
        let key = (registration.method.clone(), registration.route.view_name());
        self.views.entry(key).or_default().push(registration);
    }

    /// Most specific registration for `(method, name)` usable on `object` with `layers` active.
    pub fn lookup(
        &self,
        method: &Method,
        name: &str,
        object: &ContentObject,
        layers: &[LayerTag],
    ) -> Option<&ViewRegistration> {
        let candidates = self.views.get(&(method.clone(), name.to_string()))?;

        let usable = |registration: &&ViewRegistration| {
            registration.context.accepts(object)
                && registration
                    .layer
                    .as_ref()
                    .map_or(true, |layer| layers.contains(layer))
        };

        candidates
            .iter()
            .filter(usable)
            .find(|registration| registration.layer.is_some())
            .or_else(|| candidates.iter().filter(usable).next())
    }

    /// Look up a view and validate the tail against its route.
    pub fn try_resolve_view<S: AsRef<str>>(
        &self,
        method: &Method,
        name: &str,
        object: &ContentObject,
        layers: &[LayerTag],
        tail: &[S],
    ) -> Option<ResolvedView> {
        let registration = self.lookup(method, name, object, layers)?;
        let matchdict = registration.route.matches(tail)?;

        Some(ResolvedView {
            view: Arc::clone(&registration.view),
            permission: registration.permission,
            matchdict,
        })
    }

    pub fn len(&self) -> usize {
        self.views.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
