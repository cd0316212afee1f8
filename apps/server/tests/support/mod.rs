pub mod assertions;
pub mod builders;
pub mod fixtures;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Map, Value};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tower::ServiceExt as _;
use vellum::{
    api::create_router,
    auth::Claims,
    layers::LayerTag,
    security::permissions,
    state::AppStateOptions,
    views::{ContextFilter, View, ViewContext, ViewOutput, ViewRegistration},
    AppState, Config, Error,
};

// Re-export commonly used items
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

use fixtures::constants::{CONTAINER, DB, GREETING_LAYER, JWT_SECRET};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Calls made to `@test-retry-logic` so far.
    pub retry_calls: Arc<AtomicU32>,
    /// Calls made to `@test-always-conflict` so far.
    pub conflict_calls: Arc<AtomicU32>,
    root_token: Option<String>,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::new_with_config(|_| {}).await
    }

    /// App on the in-memory backend with container `/db/site` already created.
    pub async fn new_with_config(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        init_tracing();

        let mut config = base_config();
        configure(&mut config);

        let root_token = config
            .auth
            .enabled
            .then(|| mint_token(&config.auth.root_user, &[]))
            .transpose()?;

        let retry_calls = Arc::new(AtomicU32::new(0));
        let conflict_calls = Arc::new(AtomicU32::new(0));
        let state = AppState::new_with_options(
            config,
            AppStateOptions {
                extra_views: test_views(Arc::clone(&retry_calls), Arc::clone(&conflict_calls)),
                databases: None,
            },
        )
        .await
        .context("initialize AppState")?;

        let router = create_router(state.clone());
        let app = Self {
            router,
            state,
            retry_calls,
            conflict_calls,
            root_token,
        };

        let (status, _headers, body) = app
            .request(
                Method::POST,
                &format!("/{DB}"),
                Some(to_json_body(&container_payload(CONTAINER))?),
            )
            .await?;
        anyhow::ensure!(
            status == StatusCode::CREATED,
            "container setup failed with {status}: {}",
            String::from_utf8_lossy(&body)
        );

        Ok(app)
    }

    /// Request as root (the only identity when auth is disabled).
    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        self.request_with_extra_headers(method, path_and_query, body, &[])
            .await
    }

    /// Request carrying a bearer token for `token`, or no token at all.
    pub async fn request_as(
        &self,
        token: Option<&str>,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let request = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("host", "example.org")
            .header("accept", "application/json")
            .header("content-type", "application/json");
        let request = match token {
            Some(token) => request.header("authorization", format!("Bearer {token}")),
            None => request,
        };
        let request = request
            .body(match body {
                Some(bytes) => Body::from(bytes),
                None => Body::empty(),
            })
            .context("build request")?;

        self.dispatch(request).await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let mut request = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("host", "example.org")
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .body(match body {
                Some(bytes) => Body::from(bytes),
                None => Body::empty(),
            })
            .context("build request")?;

        if let Some(token) = &self.root_token {
            request.headers_mut().insert(
                "authorization",
                format!("Bearer {token}")
                    .parse::<HeaderValue>()
                    .context("parse authorization header")?,
            );
        }
        for (name, value) in extra_headers {
            request.headers_mut().insert(
                name.parse::<HeaderName>().context("parse header name")?,
                value.parse::<HeaderValue>().context("parse header value")?,
            );
        }

        self.dispatch(request).await
    }

    /// `POST /db/site/@batch[?query]` with `items` as body, as root.
    pub async fn batch(
        &self,
        query: &str,
        items: &Value,
    ) -> anyhow::Result<(StatusCode, Vec<Value>)> {
        let (status, _headers, body) = self
            .request(
                Method::POST,
                &batch_path(query),
                Some(to_json_body(items)?),
            )
            .await?;
        anyhow::ensure!(
            status == StatusCode::OK,
            "batch failed with {status}: {}",
            String::from_utf8_lossy(&body)
        );
        Ok((status, batch_records(&body)?))
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        Ok((status, headers, body))
    }
}

pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a TestApp,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    with_test_app_with_config(|_| {}, f).await
}

pub async fn with_test_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(
        &'a TestApp,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>,
    >,
{
    let app = TestApp::new_with_config(configure).await?;
    f(&app).await
}

/// Turn on bearer-token authentication with the test secret.
pub fn enable_auth(config: &mut Config) {
    config.auth.enabled = true;
    config.auth.jwt_secret = Some(JWT_SECRET.to_string());
}

/// HS256 token for `sub` signed with the test secret.
pub fn mint_token(sub: &str, roles: &[&str]) -> anyhow::Result<String> {
    let claims = Claims {
        sub: sub.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: 4_102_444_800,
        iss: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .context("encode test token")
}

pub fn content_path(path: &str) -> String {
    if path.is_empty() {
        format!("/{DB}/{CONTAINER}")
    } else {
        format!("/{DB}/{CONTAINER}/{path}")
    }
}

pub fn batch_path(query: &str) -> String {
    if query.is_empty() {
        content_path("@batch")
    } else {
        format!("{}?{query}", content_path("@batch"))
    }
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.batch.conflict_backoff_ms = 10;
    config.layers.installed = vec![GREETING_LAYER.to_string()];
    config
}

/// Views only registered in tests.
fn test_views(
    retry_calls: Arc<AtomicU32>,
    conflict_calls: Arc<AtomicU32>,
) -> Vec<ViewRegistration> {
    vec![
        ViewRegistration::new(
            Method::GET,
            "@test-retry-logic",
            permissions::VIEW_CONTENT,
            Arc::new(ConflictOnce { calls: retry_calls }),
        )
        .for_context(ContextFilter::Folderish),
        ViewRegistration::new(
            Method::GET,
            "@test-always-conflict",
            permissions::VIEW_CONTENT,
            Arc::new(AlwaysConflict {
                calls: conflict_calls,
            }),
        ),
        ViewRegistration::new(
            Method::GET,
            "@echo-headers",
            permissions::VIEW_CONTENT,
            Arc::new(EchoHeaders),
        ),
        ViewRegistration::new(
            Method::GET,
            "@hello",
            permissions::VIEW_CONTENT,
            Arc::new(Hello),
        )
        .for_layer(LayerTag::new(GREETING_LAYER)),
    ]
}

/// Raises a write conflict on its first call, then succeeds.
struct ConflictOnce {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl View for ConflictOnce {
    async fn call(&self, _ctx: &ViewContext<'_>) -> vellum::Result<ViewOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            return Err(Error::WriteConflict("induced by test view".to_string()));
        }
        Ok(ViewOutput::Data(json!({ "attempt": call })))
    }
}

/// Raises a write conflict on every call.
struct AlwaysConflict {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl View for AlwaysConflict {
    async fn call(&self, _ctx: &ViewContext<'_>) -> vellum::Result<ViewOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::WriteConflict("always induced by test view".to_string()))
    }
}

/// Returns the sub-request's headers and body.
struct EchoHeaders;

#[async_trait]
impl View for EchoHeaders {
    async fn call(&self, ctx: &ViewContext<'_>) -> vellum::Result<ViewOutput> {
        let mut headers = Map::new();
        for (name, value) in &ctx.request.headers {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), json!(value));
            }
        }
        Ok(ViewOutput::Data(json!({
            "headers": headers,
            "body": ctx.request.json()?,
            "url": ctx.request.url.as_str(),
        })))
    }
}

struct Hello;

#[async_trait]
impl View for Hello {
    async fn call(&self, _ctx: &ViewContext<'_>) -> vellum::Result<ViewOutput> {
        Ok(ViewOutput::Data(json!({ "greeting": "hello" })))
    }
}

fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "vellum=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
