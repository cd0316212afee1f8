//! Permission ids, roles and the default permission checker.
//!
//! Evaluation order for a non-root principal:
//! 1. settings stored on the object itself (`Allow`, `Deny`, `AllowSingle`)
//! 2. inherited settings, nearest ancestor first (`AllowSingle` does not inherit)
//! 3. the principal's global roles

use crate::auth::Principal;
use crate::models::{ContentObject, PermissionSetting};

pub mod permissions {
    pub const ACCESS_CONTENT: &str = "vellum.AccessContent";
    pub const VIEW_CONTENT: &str = "vellum.ViewContent";
    pub const ADD_CONTENT: &str = "vellum.AddContent";
    pub const MODIFY_CONTENT: &str = "vellum.ModifyContent";
    pub const DELETE_CONTENT: &str = "vellum.DeleteContent";
    pub const SEE_PERMISSIONS: &str = "vellum.SeePermissions";
    pub const CHANGE_PERMISSIONS: &str = "vellum.ChangePermissions";
    pub const READ_CONFIGURATION: &str = "vellum.ReadConfiguration";
    pub const WRITE_CONFIGURATION: &str = "vellum.WriteConfiguration";

    pub const ALL: &[&str] = &[
        ACCESS_CONTENT,
        VIEW_CONTENT,
        ADD_CONTENT,
        MODIFY_CONTENT,
        DELETE_CONTENT,
        SEE_PERMISSIONS,
        CHANGE_PERMISSIONS,
        READ_CONFIGURATION,
        WRITE_CONFIGURATION,
    ];

    pub fn is_known(permission: &str) -> bool {
        ALL.contains(&permission)
    }
}

pub mod roles {
    pub const READER: &str = "vellum.Reader";
    pub const EDITOR: &str = "vellum.Editor";
    pub const MANAGER: &str = "vellum.Manager";
}

/// Permissions granted by a global role.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    use permissions::*;

    match role {
        roles::READER => &[ACCESS_CONTENT, VIEW_CONTENT],
        roles::EDITOR => &[
            ACCESS_CONTENT,
            VIEW_CONTENT,
            ADD_CONTENT,
            MODIFY_CONTENT,
            DELETE_CONTENT,
            SEE_PERMISSIONS,
        ],
        roles::MANAGER => ALL,
        _ => &[],
    }
}

/// Decides whether a principal holds a permission on an object.
pub trait PermissionChecker: Send + Sync {
    fn check_permission(
        &self,
        principal: &Principal,
        permission: &str,
        object: &ContentObject,
    ) -> bool;
}

/// Role table plus object ACLs.
#[derive(Debug, Clone, Default)]
pub struct PolicyChecker;

impl PolicyChecker {
    pub fn new() -> Self {
        Self
    }
}

impl PermissionChecker for PolicyChecker {
    fn check_permission(
        &self,
        principal: &Principal,
        permission: &str,
        object: &ContentObject,
    ) -> bool {
        if principal.root {
            return true;
        }

        match object.acl.setting(&principal.subject, permission) {
            Some(PermissionSetting::Deny) => return false,
            Some(PermissionSetting::Allow) | Some(PermissionSetting::AllowSingle) => return true,
            None => {}
        }

        for ancestor in &object.inherited {
            match ancestor.acl.setting(&principal.subject, permission) {
                Some(PermissionSetting::Deny) => return false,
                Some(PermissionSetting::Allow) => return true,
                Some(PermissionSetting::AllowSingle) | None => {}
            }
        }

        principal
            .roles
            .iter()
            .any(|role| role_permissions(role).contains(&permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Acl, ContentType, InheritedAcl};

    fn user(roles: &[&str]) -> Principal {
        Principal {
            subject: "alice".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            root: false,
        }
    }

    fn item() -> ContentObject {
        ContentObject::new(ContentType::Item, "doc", None)
    }

    #[test]
    fn test_root_is_always_allowed() {
        let mut obj = item();
        obj.acl
            .apply("root", permissions::VIEW_CONTENT, Some(PermissionSetting::Deny));
        assert!(PolicyChecker.check_permission(&Principal::root("root"), permissions::VIEW_CONTENT, &obj));
    }

    #[test]
    fn test_roles_grant_permissions() {
        let checker = PolicyChecker::new();
        let reader = user(&[roles::READER]);
        assert!(checker.check_permission(&reader, permissions::VIEW_CONTENT, &item()));
        assert!(!checker.check_permission(&reader, permissions::ADD_CONTENT, &item()));
        assert!(!checker.check_permission(&user(&[]), permissions::ACCESS_CONTENT, &item()));
    }

    #[test]
    fn test_local_deny_beats_role() {
        let mut obj = item();
        obj.acl.apply(
            "alice",
            permissions::ACCESS_CONTENT,
            Some(PermissionSetting::Deny),
        );
        assert!(!PolicyChecker.check_permission(
            &user(&[roles::MANAGER]),
            permissions::ACCESS_CONTENT,
            &obj
        ));
    }

    #[test]
    fn test_inheritance_skips_allow_single() {
        let mut parent_acl = Acl::default();
        parent_acl.apply(
            "alice",
            permissions::VIEW_CONTENT,
            Some(PermissionSetting::AllowSingle),
        );
        parent_acl.apply("alice", permissions::ACCESS_CONTENT, Some(PermissionSetting::Allow));

        let mut obj = item();
        obj.inherited.push(InheritedAcl {
            path: "/site".to_string(),
            acl: parent_acl,
        });

        let alice = user(&[]);
        assert!(PolicyChecker.check_permission(&alice, permissions::ACCESS_CONTENT, &obj));
        assert!(!PolicyChecker.check_permission(&alice, permissions::VIEW_CONTENT, &obj));
    }
}
