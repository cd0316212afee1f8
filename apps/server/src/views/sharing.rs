//! Sharing, permission query and container registry views

use async_trait::async_trait;
use axum::http::Method;
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::sync::Arc;

use super::{
    ContextFilter, View, ViewContext, ViewOutput, ViewRegistration, ViewRegistry, ViewResponse,
};
use crate::{
    models::PermissionSetting,
    security::permissions,
    Error, Result,
};

pub(super) fn register(registry: &mut ViewRegistry) {
    registry.register(ViewRegistration::new(
        Method::GET,
        "@sharing",
        permissions::SEE_PERMISSIONS,
        Arc::new(GetSharing),
    ));
    registry.register(ViewRegistration::new(
        Method::POST,
        "@sharing",
        permissions::CHANGE_PERMISSIONS,
        Arc::new(ChangeSharing),
    ));
    registry.register(ViewRegistration::new(
        Method::GET,
        "@canido",
        permissions::ACCESS_CONTENT,
        Arc::new(CanIDo),
    ));
    registry.register(
        ViewRegistration::new(
            Method::GET,
            "@registry",
            permissions::READ_CONFIGURATION,
            Arc::new(GetRegistry),
        )
        .for_context(ContextFilter::Container),
    );
    registry.register(
        ViewRegistration::new(
            Method::PATCH,
            "@registry",
            permissions::WRITE_CONFIGURATION,
            Arc::new(PatchRegistry),
        )
        .for_context(ContextFilter::Container),
    );
}

struct GetSharing;

#[async_trait]
impl View for GetSharing {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let inherit: Vec<JsonValue> = ctx
            .context
            .inherited
            .iter()
            .map(|ancestor| {
                json!({
                    "@id": ctx.request.url_for_path(&ancestor.path),
                    "prinperm": ancestor.acl.prinperm,
                })
            })
            .collect();

        Ok(ViewOutput::Data(json!({
            "local": { "prinperm": ctx.context.acl.prinperm },
            "inherit": inherit,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct SharingChange {
    #[serde(default)]
    prinperm: Vec<PrinPermEntry>,
}

#[derive(Debug, Deserialize)]
struct PrinPermEntry {
    principal: String,
    permission: String,
    setting: SharingSetting,
}

#[derive(Debug, Clone, Copy, Deserialize)]
enum SharingSetting {
    Allow,
    Deny,
    AllowSingle,
    Unset,
}

impl SharingSetting {
    fn into_setting(self) -> Option<PermissionSetting> {
        match self {
            SharingSetting::Allow => Some(PermissionSetting::Allow),
            SharingSetting::Deny => Some(PermissionSetting::Deny),
            SharingSetting::AllowSingle => Some(PermissionSetting::AllowSingle),
            SharingSetting::Unset => None,
        }
    }
}

struct ChangeSharing;

#[async_trait]
impl View for ChangeSharing {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let change: SharingChange = serde_json::from_value(ctx.request.json()?)
            .map_err(|e| Error::InvalidRequest(format!("Invalid sharing payload: {e}")))?;

        if let Some(entry) = change
            .prinperm
            .iter()
            .find(|entry| !permissions::is_known(&entry.permission))
        {
            return Ok(ViewResponse::error(
                412,
                json!({
                    "reason": "preconditionFailed",
                    "message": format!("No valid permission id '{}'", entry.permission),
                }),
            )
            .into());
        }

        let mut object = ctx.context.clone();
        for entry in &change.prinperm {
            object
                .acl
                .apply(&entry.principal, &entry.permission, entry.setting.into_setting());
        }
        object.touch();
        ctx.request.txn.update(object).await?;

        tracing::debug!(
            path = %ctx.context.path,
            changes = change.prinperm.len(),
            "Sharing updated"
        );

        Ok(ViewOutput::Data(JsonValue::Null))
    }
}

struct CanIDo;

#[async_trait]
impl View for CanIDo {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let Some(requested) = ctx.request.query_param("permission") else {
            return Ok(ViewResponse::error(
                412,
                json!({
                    "reason": "preconditionFailed",
                    "message": "No permission param",
                }),
            )
            .into());
        };

        let mut result = JsonMap::new();
        for permission in requested.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            result.insert(
                permission.to_string(),
                JsonValue::Bool(ctx.check_permission(permission, &ctx.context)),
            );
        }

        Ok(ViewOutput::Data(JsonValue::Object(result)))
    }
}

struct GetRegistry;

#[async_trait]
impl View for GetRegistry {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        Ok(ViewOutput::Data(JsonValue::Object(
            ctx.context.registry.clone(),
        )))
    }
}

struct PatchRegistry;

#[async_trait]
impl View for PatchRegistry {
    async fn call(&self, ctx: &ViewContext<'_>) -> Result<ViewOutput> {
        let patch = ctx.request.json()?;
        if !patch.is_object() {
            return Err(Error::InvalidRequest(
                "Registry patch must be a JSON object".to_string(),
            ));
        }

        let mut object = ctx.context.clone();
        let mut registry = JsonValue::Object(std::mem::take(&mut object.registry));
        json_patch::merge(&mut registry, &patch);
        if let JsonValue::Object(registry) = registry {
            object.registry = registry;
        }
        object.touch();
        ctx.request.txn.update(object).await?;

        Ok(ViewResponse::no_content().into())
    }
}
