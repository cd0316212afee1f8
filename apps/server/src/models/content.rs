//! Content objects stored in a database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Container,
    Folder,
    Item,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Container => "Container",
            ContentType::Folder => "Folder",
            ContentType::Item => "Item",
        }
    }

    pub fn is_folderish(&self) -> bool {
        matches!(self, ContentType::Container | ContentType::Folder)
    }

    /// Whether an object of this type may be added as a child of `self`.
    pub fn allows_child(&self, child: ContentType) -> bool {
        self.is_folderish() && child != ContentType::Container
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Container" => Ok(ContentType::Container),
            "Folder" => Ok(ContentType::Folder),
            "Item" => Ok(ContentType::Item),
            other => Err(Error::PreconditionFailed(format!(
                "Unknown content type '{other}'"
            ))),
        }
    }
}

/// Per-principal permission setting stored on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionSetting {
    Allow,
    Deny,
    /// Applies to the object itself only; not inherited by children.
    AllowSingle,
}

/// Local principal → permission → setting map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    #[serde(default)]
    pub prinperm: BTreeMap<String, BTreeMap<String, PermissionSetting>>,
}

impl Acl {
    pub fn setting(&self, principal: &str, permission: &str) -> Option<PermissionSetting> {
        self.prinperm
            .get(principal)
            .and_then(|perms| perms.get(permission))
            .copied()
    }

    /// Set or (with `None`) clear a setting.
    pub fn apply(&mut self, principal: &str, permission: &str, setting: Option<PermissionSetting>) {
        match setting {
            Some(setting) => {
                self.prinperm
                    .entry(principal.to_string())
                    .or_default()
                    .insert(permission.to_string(), setting);
            }
            None => {
                if let Some(perms) = self.prinperm.get_mut(principal) {
                    perms.remove(permission);
                    if perms.is_empty() {
                        self.prinperm.remove(principal);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prinperm.is_empty()
    }
}

/// ACL of an ancestor, attached by traversal (nearest ancestor first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritedAcl {
    pub path: String,
    pub acl: Acl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentObject {
    pub id: String,
    pub uid: Uuid,
    pub type_name: ContentType,
    /// Absolute path within the database, e.g. `/site/folder/item`.
    pub path: String,
    pub parent_path: Option<String>,
    pub title: Option<String>,
    pub data: JsonMap<String, JsonValue>,
    pub acl: Acl,
    /// Container-level configuration; empty for non-containers.
    pub registry: JsonMap<String, JsonValue>,
    /// Committed version this copy was read at; 0 for objects not yet committed.
    pub version: i64,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
    #[serde(skip)]
    pub inherited: Vec<InheritedAcl>,
}

impl ContentObject {
    /// Build a new, uncommitted object. `parent` is `None` only for containers.
    pub fn new(type_name: ContentType, id: &str, parent: Option<&ContentObject>) -> Self {
        let now = Utc::now();
        let (path, parent_path) = match parent {
            Some(parent) => (child_path(&parent.path, id), Some(parent.path.clone())),
            None => (format!("/{id}"), None),
        };

        Self {
            id: id.to_string(),
            uid: Uuid::new_v4(),
            type_name,
            path,
            parent_path,
            title: None,
            data: JsonMap::new(),
            acl: Acl::default(),
            registry: JsonMap::new(),
            version: 0,
            creation_date: now,
            modification_date: now,
            inherited: Vec::new(),
        }
    }

    pub fn is_folderish(&self) -> bool {
        self.type_name.is_folderish()
    }

    /// Path relative to the owning container (empty for the container itself).
    pub fn relative_path(&self) -> &str {
        container_relative(&self.path)
    }

    pub fn touch(&mut self) {
        self.modification_date = Utc::now();
    }

    /// Editable attributes as one JSON object (`title` plus data fields).
    pub fn editable_fields(&self) -> JsonValue {
        let mut fields = self.data.clone();
        fields.insert(
            "title".to_string(),
            self.title
                .as_ref()
                .map(|t| JsonValue::String(t.clone()))
                .unwrap_or(JsonValue::Null),
        );
        JsonValue::Object(fields)
    }

    /// Replace the editable attributes from a JSON object produced by [`Self::editable_fields`].
    pub fn set_editable_fields(&mut self, fields: JsonValue) -> Result<()> {
        let JsonValue::Object(mut fields) = fields else {
            return Err(Error::InvalidRequest(
                "Content fields must be a JSON object".to_string(),
            ));
        };

        self.title = match fields.remove("title") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(title)) => Some(title),
            Some(_) => {
                return Err(Error::InvalidRequest("title must be a string".to_string()));
            }
        };
        self.data = fields;
        Ok(())
    }
}

/// Strip the container segment from an absolute object path.
pub fn container_relative(path: &str) -> &str {
    match path.trim_start_matches('/').split_once('/') {
        Some((_, rest)) => rest,
        None => "",
    }
}

pub fn child_path(parent_path: &str, id: &str) -> String {
    format!("{}/{}", parent_path.trim_end_matches('/'), id)
}

/// Ids become path segments, so they must not contain separators or look like view names.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('@')
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));

    if valid {
        Ok(())
    } else {
        Err(Error::PreconditionFailed(format!("Invalid id '{id}'")))
    }
}
