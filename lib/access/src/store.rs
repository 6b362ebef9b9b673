//! Storage traits for the access model.
//!
//! The server implements these over Postgres; [`crate::memory`] provides
//! in-process implementations for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collectdesk_core::{RoleId, UserId};

use crate::error::StoreError;
use crate::invite::InviteToken;
use crate::role::Role;
use crate::session::{Session, SessionId};
use crate::user::ApplicationUser;

/// Result type returned by every store operation.
pub type StoreResult<T> = collectdesk_core::Result<T, StoreError>;

/// Application user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user by normalized email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<ApplicationUser>>;

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<ApplicationUser>>;

    /// All users, ordered by name.
    async fn list(&self) -> StoreResult<Vec<ApplicationUser>>;

    /// Inserts a new user. Fails with `StoreError::Conflict` if the email is taken.
    async fn insert(&self, user: &ApplicationUser) -> StoreResult<()>;

    /// Replaces an existing user record.
    async fn update(&self, user: &ApplicationUser) -> StoreResult<()>;

    /// Number of users referencing the role.
    async fn count_with_role(&self, role_id: RoleId) -> StoreResult<usize>;
}

/// Roles and their permission sets.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_id(&self, id: RoleId) -> StoreResult<Option<Role>>;

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    /// All roles, system roles first.
    async fn list(&self) -> StoreResult<Vec<Role>>;

    async fn insert(&self, role: &Role) -> StoreResult<()>;

    async fn update(&self, role: &Role) -> StoreResult<()>;

    /// Deletes a role. Returns false if it did not exist.
    async fn delete(&self, id: RoleId) -> StoreResult<bool>;
}

/// Invite tokens.
#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<InviteToken>>;

    async fn insert(&self, invite: &InviteToken) -> StoreResult<()>;

    /// Consumes the invite and writes the invitee's record as one unit.
    ///
    /// Returns true for the single caller that performed the transition.
    /// Returns false and writes nothing if the invite was already consumed.
    /// On error neither the consumption nor the user write is kept, so the
    /// token stays usable.
    async fn redeem(
        &self,
        token: &str,
        invitee: Invitee<'_>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Number of invites for the role that are neither consumed nor expired.
    async fn count_open_with_role(
        &self,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> StoreResult<usize>;
}

/// The user write that accompanies a redeemed invite.
#[derive(Debug, Clone, Copy)]
pub enum Invitee<'a> {
    /// First access: the record is inserted.
    New(&'a ApplicationUser),
    /// A known email: the stored record is replaced.
    Existing(&'a ApplicationUser),
}

impl Invitee<'_> {
    #[must_use]
    pub fn user(&self) -> &ApplicationUser {
        match self {
            Self::New(user) | Self::Existing(user) => user,
        }
    }
}

/// Server-side sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> StoreResult<()>;

    async fn find_by_id(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    async fn delete(&self, id: &SessionId) -> StoreResult<()>;

    /// Deletes sessions expired at `now`, returning how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
