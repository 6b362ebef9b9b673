//! Permission evaluation.
//!
//! These functions are pure so the UI can call them synchronously in render
//! paths. Precedence: owner, then the administrator role, then membership of
//! the code in the user's permission set.

use crate::role::ADMIN_ROLE_NAME;
use crate::user::ApplicationUser;

/// Capability queries with a single precedence rule.
pub trait PermissionCheck {
    /// Returns true if the subject holds the capability.
    fn has_permission(&self, code: &str) -> bool;

    /// Returns true if any of the codes is held. An empty list holds nothing.
    fn has_any_permission(&self, codes: &[&str]) -> bool {
        codes.iter().any(|code| self.has_permission(code))
    }

    /// Returns true if every code is held. An empty list is vacuously held.
    fn has_all_permissions(&self, codes: &[&str]) -> bool {
        codes.iter().all(|code| self.has_permission(code))
    }
}

impl PermissionCheck for ApplicationUser {
    fn has_permission(&self, code: &str) -> bool {
        has_permission(self, code)
    }
}

/// Returns true if the user holds `code`.
#[must_use]
pub fn has_permission(user: &ApplicationUser, code: &str) -> bool {
    if user.is_owner {
        return true;
    }
    if user.role_name == ADMIN_ROLE_NAME {
        return true;
    }
    user.permissions.contains(code)
}

/// Returns true if the user holds at least one of `codes`.
#[must_use]
pub fn has_any_permission(user: &ApplicationUser, codes: &[&str]) -> bool {
    user.has_any_permission(codes)
}

/// Returns true if the user holds every one of `codes`.
#[must_use]
pub fn has_all_permissions(user: &ApplicationUser, codes: &[&str]) -> bool {
    user.has_all_permissions(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{PERMISSION_CATALOGUE, Role, system_roles};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn role_named(name: &str) -> Role {
        system_roles()
            .into_iter()
            .find(|r| r.name == name)
            .expect("system role")
    }

    fn user_with(permissions: &[&str]) -> ApplicationUser {
        let mut user =
            ApplicationUser::new("op@x.com", "Op".to_string(), &role_named("Operador"), Utc::now());
        user.permissions = permissions.iter().map(|c| (*c).to_string()).collect();
        user
    }

    #[test]
    fn owner_holds_every_code_regardless_of_permissions() {
        let mut user = user_with(&[]);
        user.is_owner = true;
        for permission in PERMISSION_CATALOGUE {
            assert!(has_permission(&user, permission.code));
        }
        assert!(has_permission(&user, "not.in.catalogue"));
    }

    #[test]
    fn administrator_role_holds_every_code() {
        let mut user = user_with(&[]);
        user.role_name = ADMIN_ROLE_NAME.to_string();
        assert!(has_permission(&user, "settings.manage"));
    }

    #[test]
    fn regular_user_checks_membership() {
        let user = user_with(&["cases.view"]);
        assert!(has_permission(&user, "cases.view"));
        assert!(!has_permission(&user, "cases.edit"));
    }

    #[test]
    fn any_and_all() {
        let user = user_with(&["cases.view", "cases.edit"]);
        assert!(has_any_permission(&user, &["users.manage", "cases.edit"]));
        assert!(!has_any_permission(&user, &["users.manage"]));
        assert!(!has_any_permission(&user, &[]));

        assert!(has_all_permissions(&user, &["cases.view", "cases.edit"]));
        assert!(!has_all_permissions(&user, &["cases.view", "users.manage"]));
        assert!(has_all_permissions(&user, &[]));
    }

    #[test]
    fn trait_and_free_functions_agree() {
        let user = user_with(&["analytics.view"]);
        let empty: BTreeSet<String> = BTreeSet::new();
        assert_ne!(user.permissions, empty);
        for permission in PERMISSION_CATALOGUE {
            assert_eq!(
                user.has_permission(permission.code),
                has_permission(&user, permission.code)
            );
        }
    }
}
