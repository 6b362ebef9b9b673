//! The access service: authorization lookup, invites and administration.
//!
//! Every identity goes through [`AccessService::resolve_application_user`];
//! there is no path that grants access without a stored, active record.

use chrono::{DateTime, Utc};
use collectdesk_core::{RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{
    AuthorizationError, BlockReason, InviteError, RoleError, StoreError, UserAdminError,
};
use crate::identity::{Identity, normalize_email};
use crate::invite::{InvitePresentation, InviteToken, NewInvite};
use crate::permission::PermissionCheck;
use crate::role::{ADMIN_ROLE_NAME, Role, system_roles, validate_permission_codes};
use crate::store::{InviteStore, Invitee, RoleStore, UserStore};
use crate::token::generate_secret;
use crate::user::{ApplicationUser, UserStatus};

/// Role fields accepted on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_role_color")]
    pub color: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn default_role_color() -> String {
    "#64748b".to_string()
}

/// Administrative edit of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

fn details(err: impl std::fmt::Display) -> String {
    err.to_string()
}

/// Resolves identities to application users and manages invites, roles and
/// users.
#[derive(Clone)]
pub struct AccessService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    invites: Arc<dyn InviteStore>,
}

impl AccessService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        invites: Arc<dyn InviteStore>,
    ) -> Self {
        Self {
            users,
            roles,
            invites,
        }
    }

    /// Inserts any missing system role. Existing roles are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the store error if a role cannot be read or written.
    #[instrument(skip(self))]
    pub async fn seed_system_roles(&self) -> collectdesk_core::Result<(), StoreError> {
        for role in system_roles() {
            if self.roles.find_by_name(&role.name).await?.is_none() {
                info!(role = %role.name, "seeding system role");
                self.roles.insert(&role).await?;
            }
        }
        Ok(())
    }

    /// Creates the configured owner account if no user has that email.
    ///
    /// # Errors
    ///
    /// Returns the store error if the owner cannot be created.
    #[instrument(skip(self))]
    pub async fn ensure_owner(
        &self,
        email: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> collectdesk_core::Result<(), StoreError> {
        let email = normalize_email(email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Ok(());
        }
        let Some(admin) = self.roles.find_by_name(ADMIN_ROLE_NAME).await? else {
            return Err(StoreError::Corrupt {
                details: format!("system role '{ADMIN_ROLE_NAME}' is missing"),
            }
            .into());
        };
        let owner = ApplicationUser::new(&email, name.to_string(), &admin, now).as_owner();
        self.users.insert(&owner).await?;
        info!(user_id = %owner.id, "created owner account");
        Ok(())
    }

    /// Resolves an authenticated identity to its application user.
    ///
    /// # Errors
    ///
    /// `NotRegistered` when no record exists, `Blocked` when the record
    /// refuses the identity, `Unavailable` when storage fails.
    #[instrument(skip(self, identity), fields(email = %identity.email()))]
    pub async fn resolve_application_user(
        &self,
        identity: &Identity,
    ) -> Result<ApplicationUser, AuthorizationError> {
        let email = identity.normalized_email();
        if email.is_empty() {
            return Err(AuthorizationError::NotRegistered { email });
        }

        let found = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|e| AuthorizationError::Unavailable { details: details(e) })?;
        let Some(mut user) = found else {
            debug!("no application user for identity");
            return Err(AuthorizationError::NotRegistered { email });
        };

        let blocked = |reason: BlockReason| AuthorizationError::Blocked {
            email: email.clone(),
            reason,
        };

        if !identity.email_verified() {
            return Err(blocked(BlockReason::UnverifiedEmail));
        }
        if let Some(reason) = user.status.block_reason() {
            return Err(blocked(reason));
        }
        if user
            .provider_user_id
            .as_deref()
            .is_some_and(|bound| bound != identity.provider_user_id())
        {
            warn!(user_id = %user.id, "identity subject does not match bound account");
            return Err(blocked(BlockReason::SubjectMismatch));
        }

        let role = self
            .roles
            .find_by_id(user.role_id)
            .await
            .map_err(|e| AuthorizationError::Unavailable { details: details(e) })?;
        let Some(role) = role else {
            warn!(user_id = %user.id, role_id = %user.role_id, "user references a missing role");
            return Err(blocked(BlockReason::RoleMissing));
        };
        user.apply_role(&role);
        Ok(user)
    }

    /// Resolves the identity and requires a capability.
    ///
    /// # Errors
    ///
    /// Any lookup error, or `PermissionDenied`.
    pub async fn authorize(
        &self,
        identity: &Identity,
        permission: &str,
    ) -> Result<ApplicationUser, AuthorizationError> {
        let user = self.resolve_application_user(identity).await?;
        if user.has_permission(permission) {
            Ok(user)
        } else {
            Err(AuthorizationError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    /// Records a login for a resolved user, binding the provider subject on
    /// first use.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the record cannot be written.
    #[instrument(skip(self, user, identity), fields(user_id = %user.id))]
    pub async fn record_login(
        &self,
        user: &ApplicationUser,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<ApplicationUser, AuthorizationError> {
        let mut updated = user.clone();
        updated.record_login(now);
        if updated.provider_user_id.is_none() {
            updated.provider_user_id = Some(identity.provider_user_id().to_string());
        }
        if updated.avatar_url.is_none() {
            updated.avatar_url = identity.avatar_url().map(str::to_string);
        }
        self.users
            .update(&updated)
            .await
            .map_err(|e| AuthorizationError::Unavailable { details: details(e) })?;
        Ok(updated)
    }

    /// Issues an invite on behalf of `inviter`.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` without `users.invite`, `RoleNotFound`,
    /// `InvalidRequest` for bad parameters, `Unavailable` on storage failure.
    #[instrument(skip(self, inviter, request), fields(inviter = %inviter.id))]
    pub async fn create_invite(
        &self,
        inviter: &ApplicationUser,
        request: NewInvite,
        now: DateTime<Utc>,
    ) -> Result<InviteToken, InviteError> {
        if !inviter.has_permission("users.invite") {
            return Err(InviteError::PermissionDenied);
        }
        let role = self
            .roles
            .find_by_id(request.role_id)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?;
        if role.is_none() {
            return Err(InviteError::RoleNotFound);
        }
        let token = generate_secret().map_err(|e| InviteError::Unavailable { details: details(e) })?;
        let invite = request.into_token(token, inviter.id, now)?;
        self.invites
            .insert(&invite)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?;
        info!(invite_id = %invite.id, expires_at = %invite.expires_at, "invite issued");
        Ok(invite)
    }

    /// Returns the public view of a usable invite.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadyUsed`, `Expired`, `RoleNotFound` or `Unavailable`.
    #[instrument(skip(self, token))]
    pub async fn present_invite(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<InvitePresentation, InviteError> {
        let invite = self.find_invite(token).await?;
        invite.ensure_usable(now)?;
        let role = self.invite_role(&invite).await?;
        let invited_by_name = match self.users.find_by_id(invite.invited_by).await {
            Ok(found) => found.map(|u| u.name),
            Err(e) => {
                warn!(error = %e, "could not load inviter");
                None
            }
        };
        Ok(invite.presentation(role.name, role.color, invited_by_name))
    }

    /// Accepts an invite for `identity`.
    ///
    /// The token is burned only after every check passes, and only together
    /// with the user write. Exactly one caller wins the redemption; every
    /// other attempt, concurrent or later, fails with `AlreadyUsed` and
    /// creates nothing. A storage failure leaves the token usable.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AlreadyUsed`, `Expired`, `ValidationMismatch` (token kept),
    /// `IdentityRejected` (token kept), `RoleNotFound` or `Unavailable`.
    #[instrument(skip(self, token, identity, validated_corporate_email), fields(email = %identity.email()))]
    pub async fn accept_invite(
        &self,
        token: &str,
        identity: &Identity,
        validated_corporate_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApplicationUser, InviteError> {
        let invite = self.find_invite(token).await?;
        invite.ensure_usable(now)?;
        invite.check_corporate_email(validated_corporate_email)?;
        if !identity.email_verified() {
            warn!(invite_id = %invite.id, "unverified email offered for invite");
            return Err(InviteError::IdentityRejected {
                reason: BlockReason::UnverifiedEmail,
            });
        }
        let role = self.invite_role(&invite).await?;

        let email = identity.normalized_email();
        let existing = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?;

        let user = match existing {
            Some(mut user) => {
                let subject = identity.provider_user_id();
                if user.provider_user_id.as_deref().is_some_and(|bound| bound != subject) {
                    warn!(user_id = %user.id, invite_id = %invite.id, "invite offered to a different provider account");
                    return Err(InviteError::IdentityRejected {
                        reason: BlockReason::SubjectMismatch,
                    });
                }
                if !user.is_owner {
                    user.apply_role(&role);
                }
                user.status = UserStatus::Active;
                user.provider_user_id = Some(subject.to_string());
                user.updated_at = now;
                self.redeem(&invite, Invitee::Existing(&user), now).await?;
                info!(user_id = %user.id, invite_id = %invite.id, "invite reactivated existing user");
                user
            }
            None => {
                let name = if invite.name.is_empty() {
                    identity.display_name().unwrap_or(&email).to_string()
                } else {
                    invite.name.clone()
                };
                let mut user = ApplicationUser::new(&email, name, &role, now);
                user.avatar_url = identity.avatar_url().map(str::to_string);
                user.provider_user_id = Some(identity.provider_user_id().to_string());
                self.redeem(&invite, Invitee::New(&user), now).await?;
                info!(user_id = %user.id, invite_id = %invite.id, "invite created user");
                user
            }
        };
        Ok(user)
    }

    async fn redeem(
        &self,
        invite: &InviteToken,
        invitee: Invitee<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), InviteError> {
        let won = self
            .invites
            .redeem(&invite.token, invitee, now)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?;
        if !won {
            info!(invite_id = %invite.id, "lost race to redeem invite");
            return Err(InviteError::AlreadyUsed);
        }
        Ok(())
    }

    async fn find_invite(&self, token: &str) -> Result<InviteToken, InviteError> {
        self.invites
            .find_by_token(token)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?
            .ok_or(InviteError::NotFound)
    }

    async fn invite_role(&self, invite: &InviteToken) -> Result<Role, InviteError> {
        self.roles
            .find_by_id(invite.role_id)
            .await
            .map_err(|e| InviteError::Unavailable { details: details(e) })?
            .ok_or(InviteError::RoleNotFound)
    }

    /// All roles, system roles first.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    pub async fn list_roles(&self) -> Result<Vec<Role>, RoleError> {
        self.roles
            .list()
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })
    }

    /// Creates a custom role.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `UnknownPermission`, `DuplicateName` or `Unavailable`.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_role(&self, input: RoleInput) -> Result<Role, RoleError> {
        let role = Role::custom(input.name, input.description, input.color, input.permissions)?;
        self.ensure_name_free(&role.name, None).await?;
        self.roles
            .insert(&role)
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?;
        info!(role_id = %role.id, "role created");
        Ok(role)
    }

    /// Updates a role. System roles keep their name.
    ///
    /// # Errors
    ///
    /// `NotFound`, `SystemRole` on rename, `InvalidName`, `UnknownPermission`,
    /// `DuplicateName` or `Unavailable`.
    #[instrument(skip(self, input), fields(role_id = %id))]
    pub async fn update_role(&self, id: RoleId, input: RoleInput) -> Result<Role, RoleError> {
        let mut role = self.get_role(id).await?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(RoleError::InvalidName);
        }
        if role.is_system && name != role.name {
            return Err(RoleError::SystemRole { name: role.name });
        }
        validate_permission_codes(&input.permissions)?;
        self.ensure_name_free(&name, Some(id)).await?;

        role.name = name;
        role.description = input.description;
        role.color = input.color;
        role.permissions = input.permissions;
        self.roles
            .update(&role)
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?;
        Ok(role)
    }

    /// Deletes a custom role that no user and no open invite references.
    ///
    /// Consumed and expired invites go with the role.
    ///
    /// # Errors
    ///
    /// `NotFound`, `SystemRole`, `InUse` or `Unavailable`.
    #[instrument(skip(self), fields(role_id = %id))]
    pub async fn delete_role(&self, id: RoleId) -> Result<(), RoleError> {
        let role = self.get_role(id).await?;
        if role.is_system {
            return Err(RoleError::SystemRole { name: role.name });
        }
        let users = self
            .users
            .count_with_role(id)
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?;
        let invites = self
            .invites
            .count_open_with_role(id, Utc::now())
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?;
        if users > 0 || invites > 0 {
            return Err(RoleError::InUse {
                name: role.name,
                users,
                invites,
            });
        }
        match self.roles.delete(id).await {
            Ok(_) => {
                info!("role deleted");
                Ok(())
            }
            // A user or invite took the role between the count and the delete.
            Err(e) if matches!(e.current_context(), StoreError::Conflict { .. }) => {
                warn!(error = %e, "role referenced at delete time");
                Err(RoleError::InUse {
                    name: role.name,
                    users,
                    invites,
                })
            }
            Err(e) => Err(RoleError::Unavailable { details: details(e) }),
        }
    }

    async fn get_role(&self, id: RoleId) -> Result<Role, RoleError> {
        self.roles
            .find_by_id(id)
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?
            .ok_or_else(|| RoleError::NotFound { id: id.to_string() })
    }

    async fn ensure_name_free(&self, name: &str, except: Option<RoleId>) -> Result<(), RoleError> {
        let clash = self
            .roles
            .find_by_name(name)
            .await
            .map_err(|e| RoleError::Unavailable { details: details(e) })?;
        match clash {
            Some(other) if Some(other.id) != except => Err(RoleError::DuplicateName {
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// All users with role data refreshed.
    ///
    /// # Errors
    ///
    /// `Unavailable` on storage failure.
    pub async fn list_users(&self) -> Result<Vec<ApplicationUser>, UserAdminError> {
        let unavailable = |e: rootcause::Report<StoreError>| UserAdminError::Unavailable {
            details: details(e),
        };
        let roles: HashMap<RoleId, Role> = self
            .roles
            .list()
            .await
            .map_err(unavailable)?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let mut users = self.users.list().await.map_err(unavailable)?;
        for user in &mut users {
            if let Some(role) = roles.get(&user.role_id) {
                user.apply_role(role);
            }
        }
        Ok(users)
    }

    /// Changes a user's role or status.
    ///
    /// # Errors
    ///
    /// `NotFound`, `RoleNotFound`, `OwnerProtected`, `SelfDeactivation` or
    /// `Unavailable`.
    #[instrument(skip(self, actor, update), fields(actor = %actor.id, user_id = %id))]
    pub async fn update_user(
        &self,
        actor: &ApplicationUser,
        id: UserId,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<ApplicationUser, UserAdminError> {
        let mut user = self
            .users
            .find_by_id(id)
            .await
            .map_err(|e| UserAdminError::Unavailable { details: details(e) })?
            .ok_or_else(|| UserAdminError::NotFound { id: id.to_string() })?;

        if update.status.is_some_and(|status| status != UserStatus::Active) {
            if user.is_owner {
                return Err(UserAdminError::OwnerProtected);
            }
            if user.id == actor.id {
                return Err(UserAdminError::SelfDeactivation);
            }
        }

        if let Some(role_id) = update.role_id {
            let role = self
                .roles
                .find_by_id(role_id)
                .await
                .map_err(|e| UserAdminError::Unavailable { details: details(e) })?
                .ok_or_else(|| UserAdminError::RoleNotFound {
                    id: role_id.to_string(),
                })?;
            if user.is_owner && !role.is_admin() {
                return Err(UserAdminError::OwnerProtected);
            }
            user.apply_role(&role);
        }
        if let Some(status) = update.status {
            user.status = status;
        }
        user.updated_at = now;

        self.users
            .update(&user)
            .await
            .map_err(|e| UserAdminError::Unavailable { details: details(e) })?;
        info!(status = %user.status, role = %user.role_name, "user updated");
        Ok(user)
    }
}
