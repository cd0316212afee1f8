//! Default content views: read, add, modify, delete, children, download

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::Method;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    ContextFilter, StreamResponse, View, ViewContext, ViewOutput, ViewRegistration,
    ViewRegistry, ViewResponse,
};
use crate::{
    models::{child_path, validate_id, ContentObject, ContentType, InheritedAcl},
    request::ContentRequest,
    security::permissions,
    Error, Result,
};

pub(super) fn register(registry: &mut ViewRegistry) {
    registry.register(ViewRegistration::new(
        Method::GET,
        "",
        permissions::VIEW_CONTENT,
        Arc::new(GetContent),
    ));
    registry.register(
        ViewRegistration::new(
            Method::POST,
            "",
            permissions::ADD_CONTENT,
            Arc::new(AddContent),
        )
        .for_context(ContextFilter::Folderish),
    );
    registry.register(ViewRegistration::new(
        Method::PATCH,
        "",
        permissions::MODIFY_CONTENT,
        Arc::new(ModifyContent),
    ));
    registry.register(ViewRegistration::new(
        Method::DELETE,
        "",
        permissions::DELETE_CONTENT,
        Arc::new(DeleteContent),
    ));
    registry.register(
        ViewRegistration::new(
            Method::GET,
            "@children",
            permissions::VIEW_CONTENT,
            Arc::new(ListChildren),
        )
        .for_context(ContextFilter::Folderish),
    );
    registry.register(ViewRegistration::new(
        Method::GET,
        "@download/{field}",
        permissions::VIEW_CONTENT,
        Arc::new(DownloadField),
    ));
}

/// Full JSON representation of an object.
pub fn serialize_object(request: &ContentRequest, object: &ContentObject) -> JsonValue {
    let mut result = JsonMap::new();
    result.insert("@id".into(), json!(request.url_for(object)));
    result.insert("@type".into(), json!(object.type_name.as_str()));
    result.insert("@name".into(), json!(object.id));
    result.insert("@uid".into(), json!(object.uid));
    if let Some(parent) = &object.parent_path {
        result.insert(
            "parent".into(),
            json!({ "@id": request.url_for_path(parent) }),
        );
    }
    result.insert("title".into(), json!(object.title));
    result.insert("creation_date".into(), json!(object.creation_date));
    result.insert("modification_date".into(), json!(object.modification_date));
    result.insert("is_folderish".into(), json!(object.is_folderish()));
    for (key, value) in &object.data {
        result.entry(key.clone()).or_insert_with(|| value.clone());
    }
    JsonValue::Object(result)
}

/// Short JSON representation used in listings and creation responses.
pub fn summarize_object(request: &ContentRequest, object: &ContentObject) -> JsonValue {
    json!({
        "@id": request.url_for(object),
        "@name": object.id,
        "@type": object.type_name.as_str(),
        "@uid": object.uid,
        "title": object.title,
    })
}

struct GetContent;

#[async_trait]
impl View for GetContent {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        Ok(ViewOutput::Data(serialize_object(ctx.request, &ctx.context)))
    }
}

struct AddContent;

#[async_trait]
impl View for AddContent {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let JsonValue::Object(mut payload) = ctx.request.json()? else {
            return Err(Error::InvalidRequest(
                "Content payload must be a JSON object".to_string(),
            ));
        };

        let type_name: ContentType = match payload.remove("@type") {
            Some(JsonValue::String(type_name)) => type_name.parse()?,
            _ => {
                return Err(Error::PreconditionFailed(
                    "Property '@type' is required".to_string(),
                ))
            }
        };
        if !ctx.context.type_name.allows_child(type_name) {
            return Err(Error::PreconditionFailed(format!(
                "{} is not allowed in {}",
                type_name, ctx.context.type_name
            )));
        }

        let id = match payload.remove("id") {
            Some(JsonValue::String(id)) => id,
            None | Some(JsonValue::Null) => Uuid::new_v4().simple().to_string(),
            Some(_) => return Err(Error::PreconditionFailed("id must be a string".to_string())),
        };
        validate_id(&id)?;

        let path = child_path(&ctx.context.path, &id);
        if ctx.request.txn.read(&path).await?.is_some() {
            return Err(Error::DuplicateId(format!(
                "{id} already exists in {}",
                ctx.context.path
            )));
        }

        let mut object = ContentObject::new(type_name, &id, Some(&ctx.context));
        payload.retain(|key, _| !key.starts_with('@'));
        object.set_editable_fields(JsonValue::Object(payload))?;

        let object = ctx.request.txn.insert(object).await?;
        tracing::debug!(path = %object.path, type_name = %object.type_name, "Content added");

        Ok(ViewResponse::created(summarize_object(ctx.request, &object)).into())
    }
}

struct ModifyContent;

#[async_trait]
impl View for ModifyContent {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let JsonValue::Object(mut patch) = ctx.request.json()? else {
            return Err(Error::InvalidRequest(
                "Patch payload must be a JSON object".to_string(),
            ));
        };
        patch.retain(|key, _| !key.starts_with('@') && key != "id");

        let mut object = ctx.context.clone();
        let mut fields = object.editable_fields();
        json_patch::merge(&mut fields, &JsonValue::Object(patch));
        object.set_editable_fields(fields)?;
        object.touch();

        ctx.request.txn.update(object).await?;

        Ok(ViewResponse::no_content().into())
    }
}

struct DeleteContent;

#[async_trait]
impl View for DeleteContent {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        ctx.request.txn.delete(&ctx.context.path).await?;
        tracing::debug!(path = %ctx.context.path, "Content deleted");
        Ok(ViewOutput::Data(JsonValue::Null))
    }
}

struct ListChildren;

#[async_trait]
impl View for ListChildren {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let mut items = Vec::new();
        for mut child in ctx.request.txn.children(&ctx.context.path).await? {
            child.inherited.push(InheritedAcl {
                path: ctx.context.path.clone(),
                acl: ctx.context.acl.clone(),
            });
            child.inherited.extend(ctx.context.inherited.iter().cloned());

            if ctx.check_permission(permissions::ACCESS_CONTENT, &child) {
                items.push(summarize_object(ctx.request, &child));
            }
        }

        Ok(ViewOutput::Data(json!({
            "items_total": items.len(),
            "items": items,
        })))
    }
}

struct DownloadField;

#[async_trait]
impl View for DownloadField {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let field = ctx.param("field")?;

        let body = match field {
            "title" => ctx.context.title.clone(),
            field => ctx.context.data.get(field).map(|value| match value {
                JsonValue::String(text) => text.clone(),
                other => other.to_string(),
            }),
        };

        let Some(body) = body else {
            return Ok(ViewResponse::error(
                404,
                json!({ "reason": "notFound", "message": format!("No field '{field}'") }),
            )
            .into());
        };

        Ok(ViewOutput::Stream(StreamResponse {
            status: 200,
            body: Bytes::from(body),
            content_type: "text/plain; charset=utf-8".to_string(),
        }))
    }
}
