//! API layer - routes, handlers, and middleware

pub mod handlers;
pub mod middleware;
pub mod url;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{any, get, post},
    Router,
};
use serde_json::json;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_request_body_size;
    let cors_origins = state.config.server.cors_origins.clone();

    // Everything below /{db} runs as an authenticated principal
    let content_router = Router::new()
        .route("/:db", post(handlers::create_container))
        .route("/:db/:container", any(handlers::dispatch_content))
        .route("/:db/:container/*path", any(handlers::dispatch_content))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/favicon.ico", get(favicon))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(content_router)
        .with_state(state)
        // Add middleware (applied in reverse order)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(middleware::compression())
        .layer(middleware::cors(&cors_origins))
        .layer(middleware::trace())
        .layer(DefaultBodyLimit::max(max_body_size))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "vellum"
    }))
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "server": "vellum",
            "version": env!("CARGO_PKG_VERSION"),
            "databases": state.databases.ids(),
            "status": "running"
        })),
    )
}

async fn favicon() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
