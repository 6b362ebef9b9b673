//! Application user records.
//!
//! An `ApplicationUser` is the internal authorization record for a person.
//! It is distinct from the [`Identity`](crate::identity::Identity) the OAuth
//! provider reports: the server binds the two by email lookup, never the
//! client.

use chrono::{DateTime, Utc};
use collectdesk_core::{RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::BlockReason;
use crate::role::Role;

/// Lifecycle status of an application user.
///
/// Users are never deleted; deactivation is a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Pending,
}

impl UserStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }

    /// The reason a non-active status refuses access, if any.
    #[must_use]
    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            Self::Active => None,
            Self::Inactive => Some(BlockReason::Inactive),
            Self::Pending => Some(BlockReason::PendingActivation),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown user status '{}'", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for UserStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "pending" => Ok(Self::Pending),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Internal authorization record for a person using the dashboard.
///
/// `role_name`, `role_color` and `permissions` are denormalized from the
/// referenced role and refreshed on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUser {
    pub id: UserId,
    /// Normalized (trimmed, lowercase) email; unique across users.
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role_id: RoleId,
    pub role_name: String,
    pub role_color: String,
    pub status: UserStatus,
    pub is_owner: bool,
    pub is_mfa_enabled: bool,
    pub permissions: BTreeSet<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub login_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Provider subject bound on first login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_user_id: Option<String>,
}

impl ApplicationUser {
    /// Creates an active user holding the given role.
    #[must_use]
    pub fn new(email: &str, name: String, role: &Role, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            email: crate::identity::normalize_email(email),
            name,
            avatar_url: None,
            role_id: role.id,
            role_name: role.name.clone(),
            role_color: role.color.clone(),
            status: UserStatus::Active,
            is_owner: false,
            is_mfa_enabled: false,
            permissions: role.permissions.clone(),
            last_active_at: None,
            login_count: 0,
            created_at: now,
            updated_at: now,
            provider_user_id: None,
        }
    }

    /// Marks the user as the installation owner.
    #[must_use]
    pub fn as_owner(mut self) -> Self {
        self.is_owner = true;
        self
    }

    /// Copies the role's display data and permissions onto the record.
    pub fn apply_role(&mut self, role: &Role) {
        self.role_id = role.id;
        self.role_name = role.name.clone();
        self.role_color = role.color.clone();
        self.permissions = role.permissions.clone();
    }

    /// Records a successful login.
    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_active_at = Some(now);
        self.login_count = self.login_count.saturating_add(1);
        self.updated_at = now;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::system_roles;

    fn operator_role() -> Role {
        system_roles()
            .into_iter()
            .find(|r| r.name == "Operador")
            .expect("operator role")
    }

    #[test]
    fn new_user_copies_role() {
        let role = operator_role();
        let user = ApplicationUser::new(" Ana@Empresa.com.br", "Ana".to_string(), &role, Utc::now());
        assert_eq!(user.email, "ana@empresa.com.br");
        assert_eq!(user.role_id, role.id);
        assert_eq!(user.role_name, "Operador");
        assert_eq!(user.permissions, role.permissions);
        assert!(user.is_active());
        assert!(!user.is_owner);
    }

    #[test]
    fn record_login_bumps_counters() {
        let mut user = ApplicationUser::new("a@x.com", "A".to_string(), &operator_role(), Utc::now());
        let now = Utc::now();
        user.record_login(now);
        user.record_login(now);
        assert_eq!(user.login_count, 2);
        assert_eq!(user.last_active_at, Some(now));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [UserStatus::Active, UserStatus::Inactive, UserStatus::Pending] {
            assert_eq!(status.as_str().parse::<UserStatus>(), Ok(status));
        }
        assert!("deleted".parse::<UserStatus>().is_err());
    }

    #[test]
    fn only_active_status_has_no_block_reason() {
        assert_eq!(UserStatus::Active.block_reason(), None);
        assert_eq!(UserStatus::Inactive.block_reason(), Some(BlockReason::Inactive));
        assert_eq!(
            UserStatus::Pending.block_reason(),
            Some(BlockReason::PendingActivation)
        );
    }

    #[test]
    fn wire_format_matches_dashboard_contract() {
        let user = ApplicationUser::new("a@x.com", "A".to_string(), &operator_role(), Utc::now());
        let json = serde_json::to_value(&user).expect("serialize");
        assert_eq!(json["roleName"], "Operador");
        assert_eq!(json["status"], "active");
        assert_eq!(json["isOwner"], false);
        assert_eq!(json["loginCount"], 0);
        assert!(json.get("providerUserId").is_none());
    }
}
