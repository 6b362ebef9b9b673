//! Authentication extractors for Axum.
//!
//! `RequireSession` establishes who the caller is. `RequireAppUser` and
//! `RequirePermission` additionally resolve the identity to an application
//! user, so a handler taking either never runs for an unregistered or
//! blocked identity.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use collectdesk_access::{ApplicationUser, AuthorizationError, PermissionCheck, Session, SessionId};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use super::AppState;
use crate::error::ApiError;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Extractor for requiring a valid session.
pub struct RequireSession(pub Session);

impl<S> FromRequestParts<S> for RequireSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match OptionalSession::from_request_parts(parts, state).await? {
            OptionalSession(Some(session)) => Ok(RequireSession(session)),
            OptionalSession(None) => Err(AuthRejection::NotAuthenticated),
        }
    }
}

/// Extractor for optionally getting the session.
///
/// Missing, unknown and expired sessions all read as `None`. Only a store
/// failure rejects.
pub struct OptionalSession(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::NotAuthenticated)?;
        Ok(OptionalSession(load_session(&app_state, &jar).await?))
    }
}

/// Loads the live session named by the session cookie.
///
/// Expired sessions are deleted best-effort and read as `None`.
///
/// # Errors
///
/// `AuthRejection::Unavailable` when the session store fails.
pub async fn load_session(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<Session>, AuthRejection> {
    let Some(session_cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let session_id = SessionId::new(session_cookie.value().to_string());

    let session = state
        .sessions
        .find_by_id(&session_id)
        .await
        .map_err(|e| AuthRejection::Unavailable {
            details: e.to_string(),
        })?;

    match session {
        Some(session) if session.is_expired_at(Utc::now()) => {
            if let Err(e) = state.sessions.delete(&session_id).await {
                warn!(error = %e, "failed to delete expired session");
            }
            Ok(None)
        }
        other => Ok(other),
    }
}

/// Extractor for requiring an authorized application user.
pub struct RequireAppUser {
    pub user: ApplicationUser,
    pub session: Session,
}

impl<S> FromRequestParts<S> for RequireAppUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireSession(session) = RequireSession::from_request_parts(parts, state).await?;
        let app_state = Arc::<AppState>::from_ref(state);
        let user = app_state
            .access
            .resolve_application_user(session.identity())
            .await
            .map_err(AuthRejection::Authorization)?;
        Ok(RequireAppUser { user, session })
    }
}

/// A permission code known at compile time.
pub trait PermissionCode {
    const CODE: &'static str;
}

macro_rules! permission_codes {
    ($($(#[$meta:meta])* $name:ident => $code:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            pub struct $name;

            impl PermissionCode for $name {
                const CODE: &'static str = $code;
            }
        )*
    };
}

permission_codes! {
    /// `users.view`
    ViewUsers => "users.view",
    /// `users.invite`
    InviteUsers => "users.invite",
    /// `users.manage`
    ManageUsers => "users.manage",
    /// `roles.manage`
    ManageRoles => "roles.manage",
}

/// Extractor for requiring an application user holding `P`.
pub struct RequirePermission<P> {
    pub user: ApplicationUser,
    _permission: PhantomData<P>,
}

impl<S, P> FromRequestParts<S> for RequirePermission<P>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
    P: PermissionCode + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAppUser { user, .. } = RequireAppUser::from_request_parts(parts, state).await?;
        if !user.has_permission(P::CODE) {
            return Err(AuthRejection::Authorization(
                AuthorizationError::PermissionDenied {
                    permission: P::CODE.to_string(),
                },
            ));
        }
        Ok(RequirePermission {
            user,
            _permission: PhantomData,
        })
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    Authorization(AuthorizationError),
    Unavailable { details: String },
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::NotAuthenticated => ApiError::NotAuthenticated,
            AuthRejection::Authorization(err) => ApiError::Authorization(err),
            AuthRejection::Unavailable { details } => {
                ApiError::Authorization(AuthorizationError::Unavailable { details })
            }
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
