//! In-process stores backed by `tokio::sync::Mutex`.
//!
//! Used by tests and by the server when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collectdesk_core::{RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::invite::{InviteStatus, InviteToken};
use crate::role::Role;
use crate::session::{Session, SessionId};
use crate::store::{InviteStore, Invitee, RoleStore, SessionStore, StoreResult, UserStore};
use crate::user::ApplicationUser;

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, ApplicationUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<ApplicationUser>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<ApplicationUser>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ApplicationUser>> {
        let mut users: Vec<_> = self.users.lock().await.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn insert(&self, user: &ApplicationUser) -> StoreResult<()> {
        let mut users = self.users.lock().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict {
                details: format!("email '{}' already registered", user.email),
            }
            .into());
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &ApplicationUser) -> StoreResult<()> {
        let mut users = self.users.lock().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::Backend {
                details: format!("user {} does not exist", user.id),
            }
            .into()),
        }
    }

    async fn count_with_role(&self, role_id: RoleId) -> StoreResult<usize> {
        let users = self.users.lock().await;
        Ok(users.values().filter(|u| u.role_id == role_id).count())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    roles: Mutex<Vec<Role>>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn find_by_id(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let roles = self.roles.lock().await;
        Ok(roles.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let roles = self.roles.lock().await;
        Ok(roles
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let mut roles = self.roles.lock().await.clone();
        roles.sort_by_key(|r| !r.is_system);
        Ok(roles)
    }

    async fn insert(&self, role: &Role) -> StoreResult<()> {
        let mut roles = self.roles.lock().await;
        if roles.iter().any(|r| r.name.eq_ignore_ascii_case(&role.name)) {
            return Err(StoreError::Conflict {
                details: format!("role '{}' already exists", role.name),
            }
            .into());
        }
        roles.push(role.clone());
        Ok(())
    }

    async fn update(&self, role: &Role) -> StoreResult<()> {
        let mut roles = self.roles.lock().await;
        match roles.iter_mut().find(|r| r.id == role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(StoreError::Backend {
                details: format!("role {} does not exist", role.id),
            }
            .into()),
        }
    }

    async fn delete(&self, id: RoleId) -> StoreResult<bool> {
        let mut roles = self.roles.lock().await;
        let before = roles.len();
        roles.retain(|r| r.id != id);
        Ok(roles.len() != before)
    }
}

/// Invites kept alongside the user store they redeem into.
///
/// The invite map stays locked across the user write, so a failed write
/// leaves the invite unconsumed.
pub struct MemoryInviteStore {
    invites: Mutex<HashMap<String, InviteToken>>,
    users: Arc<dyn UserStore>,
}

impl MemoryInviteStore {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            invites: Mutex::default(),
            users,
        }
    }
}

#[async_trait]
impl InviteStore for MemoryInviteStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<InviteToken>> {
        Ok(self.invites.lock().await.get(token).cloned())
    }

    async fn insert(&self, invite: &InviteToken) -> StoreResult<()> {
        let mut invites = self.invites.lock().await;
        if invites.contains_key(&invite.token) {
            return Err(StoreError::Conflict {
                details: "invite token collision".to_string(),
            }
            .into());
        }
        invites.insert(invite.token.clone(), invite.clone());
        Ok(())
    }

    async fn redeem(
        &self,
        token: &str,
        invitee: Invitee<'_>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut invites = self.invites.lock().await;
        let Some(invite) = invites.get_mut(token) else {
            return Ok(false);
        };
        if invite.consumed_at.is_some() {
            return Ok(false);
        }
        match invitee {
            Invitee::New(user) => self.users.insert(user).await?,
            Invitee::Existing(user) => self.users.update(user).await?,
        }
        invite.consumed_at = Some(now);
        invite.consumed_by = Some(invitee.user().id);
        Ok(true)
    }

    async fn count_open_with_role(
        &self,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let invites = self.invites.lock().await;
        Ok(invites
            .values()
            .filter(|i| i.role_id == role_id && i.status(now) == InviteStatus::Issued)
            .count())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.sessions.lock().await.get(id).cloned())
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        self.sessions.lock().await.remove(id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::invite::NewInvite;
    use crate::role::system_roles;
    use chrono::Duration;

    #[tokio::test]
    async fn user_email_is_unique() {
        let store = MemoryUserStore::new();
        let role = &system_roles()[0];
        let user = ApplicationUser::new("a@x.com", "A".to_string(), role, Utc::now());
        store.insert(&user).await.expect("first insert");

        let twin = ApplicationUser::new("a@x.com", "A2".to_string(), role, Utc::now());
        assert!(store.insert(&twin).await.is_err());
        assert_eq!(store.count_with_role(role.id).await.expect("count"), 1);
    }

    fn invite(token: &str, role_id: RoleId, now: DateTime<Utc>) -> InviteToken {
        NewInvite {
            name: "Ana".to_string(),
            role_id,
            target_email: None,
            corporate_email_hint: None,
            requires_corporate_validation: false,
            expires_in_hours: None,
        }
        .into_token(token.to_string(), UserId::new(), now)
        .expect("valid")
    }

    #[tokio::test]
    async fn redeem_succeeds_once() {
        let users = Arc::new(MemoryUserStore::new());
        let store = MemoryInviteStore::new(users.clone());
        let now = Utc::now();
        let role = &system_roles()[0];
        store.insert(&invite("tok", role.id, now)).await.expect("insert");

        let ana = ApplicationUser::new("ana@x.com", "Ana".to_string(), role, now);
        let other = ApplicationUser::new("bia@x.com", "Bia".to_string(), role, now);
        assert!(store.redeem("tok", Invitee::New(&ana), now).await.expect("redeem"));
        assert!(!store.redeem("tok", Invitee::New(&other), now).await.expect("redeem"));
        assert!(!store.redeem("missing", Invitee::New(&other), now).await.expect("redeem"));

        let stored = store.find_by_token("tok").await.expect("find").expect("exists");
        assert_eq!(stored.consumed_by, Some(ana.id));
        assert_eq!(users.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn failed_user_write_keeps_invite_open() {
        let users = Arc::new(MemoryUserStore::new());
        let store = MemoryInviteStore::new(users.clone());
        let now = Utc::now();
        let role = &system_roles()[0];
        store.insert(&invite("tok", role.id, now)).await.expect("insert");

        let ghost = ApplicationUser::new("ghost@x.com", "Ghost".to_string(), role, now);
        assert!(store.redeem("tok", Invitee::Existing(&ghost), now).await.is_err());

        let stored = store.find_by_token("tok").await.expect("find").expect("exists");
        assert_eq!(stored.consumed_at, None);
        assert_eq!(store.count_open_with_role(role.id, now).await.expect("count"), 1);
        assert!(store.redeem("tok", Invitee::New(&ghost), now).await.expect("redeem"));
        assert_eq!(store.count_open_with_role(role.id, now).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn expired_invites_are_not_open() {
        let store = MemoryInviteStore::new(Arc::new(MemoryUserStore::new()));
        let now = Utc::now();
        let role_id = RoleId::new();
        store.insert(&invite("tok", role_id, now)).await.expect("insert");

        let later = now + Duration::hours(73);
        assert_eq!(store.count_open_with_role(role_id, now).await.expect("count"), 1);
        assert_eq!(store.count_open_with_role(role_id, later).await.expect("count"), 0);
        assert_eq!(store.count_open_with_role(RoleId::new(), now).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let identity = Identity::new("1".to_string(), "a@x.com".to_string());
        let live = Session::new(SessionId::from("live"), identity.clone(), now, Duration::hours(1));
        let dead = Session::new(SessionId::from("dead"), identity, now, Duration::seconds(-1));
        store.insert(&live).await.expect("insert");
        store.insert(&dead).await.expect("insert");

        assert_eq!(store.delete_expired(now).await.expect("purge"), 1);
        assert!(store.find_by_id(live.id()).await.expect("find").is_some());
        assert!(store.find_by_id(dead.id()).await.expect("find").is_none());
    }
}
