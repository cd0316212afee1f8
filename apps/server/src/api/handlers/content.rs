//! Content handlers: container creation and top-level dispatch

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;

use crate::{
    api::url::{container_url, request_url},
    auth::{AuthenticatedPrincipal, ANONYMOUS_USER},
    batch::{CommitStrategy, ResultRecord},
    models::{validate_id, ContentObject, ContentType},
    request::ContentRequest,
    request_context::RequestContext,
    state::AppState,
    Error, Result,
};

#[derive(Debug, Deserialize)]
pub struct NewContainer {
    #[serde(rename = "@type")]
    pub type_name: String,
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub data: JsonMap<String, JsonValue>,
}

/// `POST /{db}` - create a container (root only)
pub async fn create_container(
    State(state): State<AppState>,
    Path(db): Path<String>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    headers: HeaderMap,
    Json(payload): Json<NewContainer>,
) -> Result<Response> {
    if !principal.root {
        let message = "Only the root user can create containers".to_string();
        return Err(if principal.subject == ANONYMOUS_USER {
            Error::Unauthorized(message)
        } else {
            Error::Forbidden(message)
        });
    }

    let type_name: ContentType = payload.type_name.parse()?;
    if type_name != ContentType::Container {
        return Err(Error::PreconditionFailed(format!(
            "Expected @type Container, got {type_name}"
        )));
    }
    validate_id(&payload.id)?;

    let txn = state.databases.transaction(&db)?;
    let mut container = ContentObject::new(ContentType::Container, &payload.id, None);
    if txn.read(&container.path).await?.is_some() {
        return Err(Error::DuplicateId(payload.id));
    }
    container.title = payload.title;
    container.data = payload.data;

    let container = txn.insert(container).await?;
    txn.commit().await?;

    tracing::info!(db = %db, container = %container.id, "Container created");

    let url = container_url(&headers, &db, &container.id)?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, url.to_string())],
        Json(json!({
            "@id": url.as_str(),
            "@name": container.id,
            "@type": container.type_name.as_str(),
            "@uid": container.uid,
        })),
    )
        .into_response())
}

/// `{METHOD} /{db}/{container}[/{path}]` - dispatch through traversal and views.
///
/// `POST .../@batch` on the container is handed to the batch handler.
pub async fn dispatch_content(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    request_context: Option<Extension<RequestContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let db = params
        .get("db")
        .ok_or_else(|| Error::Internal("Route is missing {db}".to_string()))?;
    let container_id = params
        .get("container")
        .ok_or_else(|| Error::Internal("Route is missing {container}".to_string()))?;

    let txn = state.databases.transaction(db)?;
    let container = txn
        .read(&format!("/{container_id}"))
        .await?
        .filter(|object| object.type_name == ContentType::Container)
        .ok_or_else(|| Error::NotFound(format!("Container '{container_id}'")))?;
    let layers = state.layers.active_layers(&container.registry);

    let mut request = ContentRequest::new(
        method,
        request_url(&headers, &uri)?,
        container_url(&headers, db, container_id)?,
        headers,
        body,
        txn,
        principal,
    )?
    .with_container(container, layers);
    request.request_id = request_context.map(|Extension(ctx)| ctx.request_id);

    if request.method == Method::POST && request.segments == ["@batch"] {
        return super::batch::run_batch(&state, request).await;
    }

    run_top_level(&state, request).await
}

async fn run_top_level(state: &AppState, request: ContentRequest) -> Result<Response> {
    let container = request.container()?.clone();

    let outcome = state
        .executor
        .execute(
            &request,
            &container,
            &request.principal,
            CommitStrategy::Eager,
        )
        .await;

    // Committed already on success; this releases a read-only or failed unit.
    if let Err(abort_err) = request.txn.abort().await {
        tracing::warn!(error = %abort_err, "Failed to release transaction");
    }

    Ok(record_response(outcome?))
}

/// Render a result record as a top-level HTTP response.
pub fn record_response(record: ResultRecord) -> Response {
    let status = StatusCode::from_u16(record.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match (record.media_type, record.body) {
        (Some(media_type), JsonValue::String(text)) => {
            (status, [(header::CONTENT_TYPE, media_type)], text).into_response()
        }
        (_, JsonValue::Null) if status == StatusCode::NO_CONTENT => status.into_response(),
        (_, body) => (status, Json(body)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_response_status_and_media_type() {
        let response = record_response(ResultRecord::not_found());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = record_response(ResultRecord {
            success: true,
            body: json!("plain"),
            status: 200,
            media_type: Some("text/plain; charset=utf-8".to_string()),
        });
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );

        let response = record_response(ResultRecord {
            success: true,
            body: JsonValue::Null,
            status: 204,
            media_type: None,
        });
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
