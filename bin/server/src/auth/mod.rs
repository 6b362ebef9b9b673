//! Authentication and authorization for the collectdesk server.
//!
//! This module provides:
//! - OIDC authentication with the external identity provider
//! - Database-backed session management
//! - Extractors that resolve the session and the application user
//! - The JSON API consumed by the dashboard
//!
//! # Access model
//!
//! A session proves who the caller is; it grants nothing by itself. Every
//! protected handler resolves the session identity to an `ApplicationUser`
//! through [`AccessService`] and checks permissions on that record. A
//! missing, inactive or unresolvable record is never treated as access.

pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;

use crate::config::{ContactConfig, SessionConfig};
use collectdesk_access::{AccessService, IdentityProvider, SessionStore};
use sqlx::PgPool;
use std::sync::Arc;

pub use middleware::{
    AuthRejection, OptionalSession, PermissionCode, RequireAppUser, RequirePermission,
    RequireSession, load_session,
};
pub use oidc::OidcClient;
pub use routes::api_router;

/// Shared application state.
pub struct AppState {
    /// Authorization lookup, invites and administration.
    pub access: AccessService,
    /// Server-side sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// The external identity provider.
    pub provider: Arc<dyn IdentityProvider>,
    /// Session configuration.
    pub session_config: SessionConfig,
    /// Contact path shown to people without access.
    pub contact: ContactConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        access: AccessService,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        session_config: SessionConfig,
        contact: ContactConfig,
    ) -> Self {
        Self {
            access,
            sessions,
            provider,
            session_config,
            contact,
        }
    }

    /// Creates the state backed by Postgres stores.
    pub fn postgres(
        pool: PgPool,
        provider: Arc<dyn IdentityProvider>,
        session_config: SessionConfig,
        contact: ContactConfig,
    ) -> Self {
        let access = AccessService::new(
            Arc::new(db::PgUserStore::new(pool.clone())),
            Arc::new(db::PgRoleStore::new(pool.clone())),
            Arc::new(db::PgInviteStore::new(pool.clone())),
        );
        Self::new(
            access,
            Arc::new(db::PgSessionStore::new(pool)),
            provider,
            session_config,
            contact,
        )
    }
}
