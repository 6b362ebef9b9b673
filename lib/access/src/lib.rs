//! Identity, authorization and invite model for the collectdesk dashboard.
//!
//! This crate provides:
//! - Provider identities and the `IdentityProvider` seam (`Identity`)
//! - Application users, roles and the permission catalogue
//! - The permission evaluator (`PermissionCheck`)
//! - Single-use invites with corporate email validation (`InviteToken`)
//! - Server-side sessions (`Session`, `SessionId`)
//! - Store traits with in-memory implementations
//! - `AccessService`, which ties the above together
//!
//! # Access model
//!
//! Authenticating with the provider proves who someone is; it grants
//! nothing. Access requires an active `ApplicationUser` with the same email,
//! created by an administrator or by accepting an invite.
//!
//! # Example
//!
//! ```
//! use collectdesk_access::{ApplicationUser, PermissionCheck, system_roles};
//! use chrono::Utc;
//!
//! let roles = system_roles();
//! let operator = roles.iter().find(|r| r.name == "Operador").unwrap();
//! let user = ApplicationUser::new("ana@empresa.com.br", "Ana".to_string(), operator, Utc::now());
//!
//! assert!(user.has_permission("cases.edit"));
//! assert!(!user.has_permission("users.manage"));
//! assert!(!user.has_any_permission(&[]));
//! ```

pub mod error;
pub mod identity;
pub mod invite;
#[cfg(feature = "memory")]
pub mod memory;
pub mod oidc;
pub mod permission;
pub mod role;
pub mod service;
pub mod session;
pub mod store;
pub mod token;
pub mod user;

pub use error::{
    AuthenticationError, AuthorizationError, BlockReason, InviteError, RoleError, StoreError,
    UserAdminError,
};
pub use identity::{Identity, IdentityProvider, LoginInitiation, PendingLogin, normalize_email};
pub use invite::{
    InvitePresentation, InviteStatus, InviteToken, NewInvite, corporate_email_matches,
    mask_corporate_hint,
};
#[cfg(feature = "memory")]
pub use memory::{MemoryInviteStore, MemoryRoleStore, MemorySessionStore, MemoryUserStore};
pub use oidc::OAuthConfig;
pub use permission::{PermissionCheck, has_all_permissions, has_any_permission, has_permission};
pub use role::{
    ADMIN_ROLE_NAME, PERMISSION_CATALOGUE, Permission, Role, permission_groups, system_roles,
};
pub use service::{AccessService, RoleInput, UserUpdate};
pub use session::{Session, SessionId};
pub use store::{InviteStore, Invitee, RoleStore, SessionStore, StoreResult, UserStore};
pub use user::{ApplicationUser, UserStatus};
