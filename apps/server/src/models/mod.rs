//! Data models for the content tree

pub mod content;

pub use content::{
    child_path, container_relative, validate_id, Acl, ContentObject, ContentType, InheritedAcl,
    PermissionSetting,
};
