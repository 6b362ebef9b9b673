//! Postgres implementations of the access store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collectdesk_access::{
    ApplicationUser, Identity, InviteStore, InviteToken, Invitee, Role, RoleStore, Session,
    SessionId, SessionStore, StoreError, StoreResult, UserStatus, UserStore,
};
use collectdesk_core::{InviteId, RoleId, UserId};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use std::str::FromStr;

fn backend(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            StoreError::Conflict {
                details: db.message().to_string(),
            }
        }
        _ => StoreError::Backend {
            details: err.to_string(),
        },
    }
}

fn corrupt(what: &str, value: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        details: format!("invalid {what} '{value}': {err}"),
    }
}

fn parse_id<T>(what: &str, value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(value).map_err(|e| corrupt(what, value, e))
}

/// Row type for user queries. Role columns come from a join.
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    avatar_url: Option<String>,
    role_id: String,
    role_name: Option<String>,
    role_color: Option<String>,
    permissions: Vec<String>,
    status: String,
    is_owner: bool,
    is_mfa_enabled: bool,
    last_active_at: Option<DateTime<Utc>>,
    login_count: i32,
    provider_user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<ApplicationUser, StoreError> {
        Ok(ApplicationUser {
            id: parse_id("user id", &self.id)?,
            email: self.email,
            name: self.name,
            avatar_url: self.avatar_url,
            role_id: parse_id("role id", &self.role_id)?,
            role_name: self.role_name.unwrap_or_default(),
            role_color: self.role_color.unwrap_or_default(),
            status: UserStatus::from_str(&self.status)
                .map_err(|e| corrupt("user status", &self.status, e))?,
            is_owner: self.is_owner,
            is_mfa_enabled: self.is_mfa_enabled,
            permissions: self.permissions.into_iter().collect(),
            last_active_at: self.last_active_at,
            login_count: u32::try_from(self.login_count).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            provider_user_id: self.provider_user_id,
        })
    }
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.email, u.name, u.avatar_url, u.role_id,
           r.name AS role_name, r.color AS role_color,
           ARRAY(
               SELECT rp.permission FROM role_permissions rp
               WHERE rp.role_id = u.role_id ORDER BY rp.permission
           ) AS permissions,
           u.status, u.is_owner, u.is_mfa_enabled, u.last_active_at, u.login_count,
           u.provider_user_id, u.created_at, u.updated_at
    FROM users u
    LEFT JOIN roles r ON r.id = u.role_id
"#;

async fn insert_user(conn: &mut PgConnection, user: &ApplicationUser) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, avatar_url, role_id, status, is_owner,
                           is_mfa_enabled, last_active_at, login_count, provider_user_id,
                           created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.avatar_url)
    .bind(user.role_id.to_string())
    .bind(user.status.as_str())
    .bind(user.is_owner)
    .bind(user.is_mfa_enabled)
    .bind(user.last_active_at)
    .bind(i32::try_from(user.login_count).unwrap_or(i32::MAX))
    .bind(&user.provider_user_id)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fails with `RowNotFound` when no row has the user's id.
async fn update_user(conn: &mut PgConnection, user: &ApplicationUser) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET name = $2, avatar_url = $3, role_id = $4, status = $5, is_owner = $6,
            is_mfa_enabled = $7, last_active_at = $8, login_count = $9,
            provider_user_id = $10, updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(&user.avatar_url)
    .bind(user.role_id.to_string())
    .bind(user.status.as_str())
    .bind(user.is_owner)
    .bind(user.is_mfa_enabled)
    .bind(user.last_active_at)
    .bind(i32::try_from(user.login_count).unwrap_or(i32::MAX))
    .bind(&user.provider_user_id)
    .bind(user.updated_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Application users in Postgres.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Creates a new user store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn collect_users(rows: Vec<UserRow>) -> StoreResult<Vec<ApplicationUser>> {
    rows.into_iter()
        .map(|r| r.try_into_user().map_err(Into::into))
        .collect()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<ApplicationUser>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{USER_SELECT} WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(UserRow::try_into_user).transpose()?)
    }

    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<ApplicationUser>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(UserRow::try_into_user).transpose()?)
    }

    async fn list(&self) -> StoreResult<Vec<ApplicationUser>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!("{USER_SELECT} ORDER BY u.name"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        collect_users(rows)
    }

    async fn insert(&self, user: &ApplicationUser) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        insert_user(&mut conn, user).await.map_err(backend)?;
        Ok(())
    }

    async fn update(&self, user: &ApplicationUser) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        update_user(&mut conn, user).await.map_err(backend)?;
        Ok(())
    }

    async fn count_with_role(&self, role_id: RoleId) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Row type for role queries.
#[derive(FromRow)]
struct RoleRow {
    id: String,
    name: String,
    description: Option<String>,
    color: String,
    is_system: bool,
    permissions: Vec<String>,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, StoreError> {
        Ok(Role {
            id: parse_id("role id", &self.id)?,
            name: self.name,
            description: self.description,
            color: self.color,
            is_system: self.is_system,
            permissions: self.permissions.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

const ROLE_SELECT: &str = r#"
    SELECT r.id, r.name, r.description, r.color, r.is_system,
           ARRAY(
               SELECT rp.permission FROM role_permissions rp
               WHERE rp.role_id = r.id ORDER BY rp.permission
           ) AS permissions
    FROM roles r
"#;

/// Roles and their permissions in Postgres.
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    /// Creates a new role store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn replace_permissions(
        tx: &mut Transaction<'_, Postgres>,
        role: &Role,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.id.to_string())
            .execute(&mut **tx)
            .await?;
        for code in &role.permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2)")
                .bind(role.id.to_string())
                .bind(code)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn find_by_id(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let row: Option<RoleRow> = sqlx::query_as(&format!("{ROLE_SELECT} WHERE r.id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(RoleRow::try_into_role).transpose()?)
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let row: Option<RoleRow> =
            sqlx::query_as(&format!("{ROLE_SELECT} WHERE lower(r.name) = lower($1)"))
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(RoleRow::try_into_role).transpose()?)
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(&format!(
            "{ROLE_SELECT} ORDER BY r.is_system DESC, r.created_at, r.name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|r| r.try_into_role().map_err(Into::into))
            .collect()
    }

    async fn insert(&self, role: &Role) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, color, is_system)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.color)
        .bind(role.is_system)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        Self::replace_permissions(&mut tx, role)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn update(&self, role: &Role) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query(
            r#"
            UPDATE roles SET name = $2, description = $3, color = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(role.id.to_string())
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.color)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        Self::replace_permissions(&mut tx, role)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, id: RoleId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Row type for invite queries.
#[derive(FromRow)]
struct InviteRow {
    id: String,
    token: String,
    name: String,
    role_id: String,
    target_email: Option<String>,
    corporate_email_hint: Option<String>,
    invited_by: String,
    expires_at: DateTime<Utc>,
    requires_corporate_validation: bool,
    consumed_at: Option<DateTime<Utc>>,
    consumed_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl InviteRow {
    fn try_into_invite(self) -> Result<InviteToken, StoreError> {
        let consumed_by = self
            .consumed_by
            .as_deref()
            .map(|id| parse_id::<UserId>("user id", id))
            .transpose()?;
        Ok(InviteToken {
            id: parse_id::<InviteId>("invite id", &self.id)?,
            token: self.token,
            name: self.name,
            role_id: parse_id("role id", &self.role_id)?,
            target_email: self.target_email,
            corporate_email_hint: self.corporate_email_hint,
            invited_by: parse_id("user id", &self.invited_by)?,
            expires_at: self.expires_at,
            requires_corporate_validation: self.requires_corporate_validation,
            consumed_at: self.consumed_at,
            consumed_by,
            created_at: self.created_at,
        })
    }
}

/// Invite tokens in Postgres.
pub struct PgInviteStore {
    pool: PgPool,
}

impl PgInviteStore {
    /// Creates a new invite store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InviteStore for PgInviteStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<InviteToken>> {
        let row: Option<InviteRow> = sqlx::query_as(
            r#"
            SELECT id, token, name, role_id, target_email, corporate_email_hint, invited_by,
                   expires_at, requires_corporate_validation, consumed_at, consumed_by, created_at
            FROM invites
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(InviteRow::try_into_invite).transpose()?)
    }

    async fn insert(&self, invite: &InviteToken) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invites (id, token, name, role_id, target_email, corporate_email_hint,
                                 invited_by, expires_at, requires_corporate_validation,
                                 consumed_at, consumed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invite.id.to_string())
        .bind(&invite.token)
        .bind(&invite.name)
        .bind(invite.role_id.to_string())
        .bind(&invite.target_email)
        .bind(&invite.corporate_email_hint)
        .bind(invite.invited_by.to_string())
        .bind(invite.expires_at)
        .bind(invite.requires_corporate_validation)
        .bind(invite.consumed_at)
        .bind(invite.consumed_by.map(|id| id.to_string()))
        .bind(invite.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn redeem(
        &self,
        token: &str,
        invitee: Invitee<'_>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        // Concurrent callers serialize on the row; only one sees consumed_at IS NULL.
        let result = sqlx::query(
            r#"
            UPDATE invites SET consumed_at = $2, consumed_by = $3
            WHERE token = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(invitee.user().id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }
        let written = match invitee {
            Invitee::New(user) => insert_user(&mut tx, user).await,
            Invitee::Existing(user) => update_user(&mut tx, user).await,
        };
        written.map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn count_open_with_role(
        &self,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invites
            WHERE role_id = $1 AND consumed_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(role_id.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    identity: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, StoreError> {
        let identity: Identity = serde_json::from_value(self.identity)
            .map_err(|e| corrupt("session identity", &self.id, e))?;
        Ok(Session::with_all_fields(
            SessionId::new(self.id),
            identity,
            self.created_at,
            self.expires_at,
        ))
    }
}

/// Server-side sessions in Postgres.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new session store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let identity = serde_json::to_value(session.identity()).map_err(|e| {
            StoreError::Corrupt {
                details: format!("cannot encode session identity: {e}"),
            }
        })?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, identity, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id().as_str())
        .bind(identity)
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, identity, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(SessionRow::try_into_session).transpose()?)
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}
