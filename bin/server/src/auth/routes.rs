//! HTTP routes for sessions, authorization, invites and administration.
//!
//! JSON endpoints live under `/api`. The `/auth/*` routes are browser
//! redirects around the provider round-trip.

use axum::{
    Json, Router,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use collectdesk_access::{
    ApplicationUser, AuthenticationError, AuthorizationError, Identity, InviteError,
    InvitePresentation, InviteToken, LoginInitiation, NewInvite, PendingLogin, Permission, Role,
    RoleInput, Session, SessionId, UserUpdate, permission_groups,
};
use collectdesk_gate::{
    AcceptInviteRequest, AccessStatus, AppUserResponse, CreateSessionRequest,
    CurrentIdentityResponse, DenialReason, RedirectUrlResponse,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{debug, info, warn};

use super::{
    AppState,
    middleware::{
        InviteUsers, ManageRoles, ManageUsers, OptionalSession, RequireAppUser,
        RequirePermission, RequireSession, SESSION_COOKIE, ViewUsers,
    },
};
use crate::config::SessionConfig;
use crate::error::ApiError;

/// Auth state cookie name (for CSRF protection during the OIDC flow).
const AUTH_STATE_COOKIE: &str = "auth_state";

/// Invite token held across the OIDC flow.
pub const PENDING_INVITE_COOKIE: &str = "pending_invite";

/// Lifetime of the cookies that span the provider round-trip.
const ROUND_TRIP_MINUTES: i64 = 10;

/// Builds the JSON API and the browser auth routes.
pub fn api_router<S>() -> Router<S>
where
    Arc<AppState>: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/api/oauth/{provider}/redirect_url", get(redirect_url))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/current", get(current_identity))
        .route("/api/users/me", get(me))
        .route("/api/invite/{token}", get(invite))
        .route("/api/invite/{token}/accept", post(accept_invite))
        .route("/api/logout", post(logout))
        .route("/api/permissions", get(permissions))
        .route("/api/roles", get(list_roles).post(create_role))
        .route("/api/roles/{id}", put(update_role).delete(delete_role))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", patch(update_user))
        .route("/api/invites", post(create_invite))
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", get(logout_redirect))
}

fn round_trip_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(ROUND_TRIP_MINUTES))
        .build()
}

fn session_cookie(config: &SessionConfig, id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(config.duration_minutes))
        .build()
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

fn auth_state_cookie(state: &AppState, pending: &PendingLogin) -> Result<Cookie<'static>, ApiError> {
    let value = serde_json::to_string(pending).map_err(|e| ApiError::Internal {
        details: format!("cannot encode auth state: {e}"),
    })?;
    Ok(round_trip_cookie(
        AUTH_STATE_COOKIE,
        value,
        state.session_config.secure_cookies,
    ))
}

fn pending_login(jar: &CookieJar) -> Result<PendingLogin, AuthenticationError> {
    let cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthenticationError::MissingPendingLogin)?;
    serde_json::from_str(cookie.value()).map_err(|_| AuthenticationError::MissingPendingLogin)
}

fn parse_path_id<T>(value: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    T::from_str(value).map_err(|e| ApiError::BadRequest {
        details: e.to_string(),
    })
}

/// Exchanges the code, stores a session and records the login.
///
/// The session proves identity only. Authorization is resolved per request.
async fn establish_session(
    state: &AppState,
    jar: CookieJar,
    code: &str,
    pending: &PendingLogin,
) -> Result<(CookieJar, Identity), ApiError> {
    let identity = state
        .provider
        .exchange_code(code, pending)
        .await
        .map_err(|report| ApiError::from(report.current_context().clone()))?;

    let now = Utc::now();
    let session_id = SessionId::generate().map_err(|e| ApiError::Internal {
        details: format!("cannot generate session id: {e}"),
    })?;
    let session = Session::new(
        session_id.clone(),
        identity.clone(),
        now,
        chrono::Duration::minutes(state.session_config.duration_minutes),
    );
    state
        .sessions
        .insert(&session)
        .await
        .map_err(|e| AuthorizationError::Unavailable {
            details: e.to_string(),
        })?;

    match state.access.resolve_application_user(&identity).await {
        Ok(user) => {
            if let Err(e) = state.access.record_login(&user, &identity, now).await {
                warn!(error = %e, user_id = %user.id, "failed to record login");
            }
            info!(user_id = %user.id, "session established");
        }
        Err(e) => debug!(reason = %e, "session established without application user"),
    }

    let jar = jar
        .add(session_cookie(&state.session_config, &session_id))
        .add(removal(AUTH_STATE_COOKIE));
    Ok((jar, identity))
}

/// Deletes the server session best-effort and drops the cookie.
async fn end_session(state: &AppState, jar: CookieJar) -> CookieJar {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = SessionId::new(cookie.value().to_string());
        if let Err(e) = state.sessions.delete(&session_id).await {
            warn!(error = %e, "failed to delete session on logout");
        }
    }
    jar.add(removal(SESSION_COOKIE))
}

/// Maps a session to what the route gate needs to know.
///
/// Storage failures become `Undetermined`, never a denial.
pub async fn access_status(state: &AppState, session: Option<&Session>) -> AccessStatus {
    let Some(session) = session else {
        return AccessStatus::Anonymous;
    };
    match state
        .access
        .resolve_application_user(session.identity())
        .await
    {
        Ok(user) => AccessStatus::Authorized(user),
        Err(e) => match DenialReason::from_error(&e) {
            Some(reason) => AccessStatus::Denied(reason),
            None => {
                warn!(error = %e, "authorization undetermined");
                AccessStatus::Undetermined
            }
        },
    }
}

/// Returns the provider authorization URL and starts the pending login.
pub async fn redirect_url(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RedirectUrlResponse>), ApiError> {
    if provider != state.provider.name() {
        return Err(ApiError::BadRequest {
            details: format!("provedor desconhecido: {provider}"),
        });
    }
    let LoginInitiation {
        authorization_url,
        pending,
    } = state.provider.authorization_url();
    let jar = jar.add(auth_state_cookie(&state, &pending)?);
    Ok((
        jar,
        Json(RedirectUrlResponse {
            redirect_url: authorization_url,
        }),
    ))
}

/// Exchanges an authorization code for a session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(CookieJar, Json<Identity>), ApiError> {
    let pending = pending_login(&jar)?;
    if request
        .state
        .as_deref()
        .is_some_and(|s| s != pending.csrf_token)
    {
        return Err(AuthenticationError::StateMismatch.into());
    }
    let (jar, identity) = establish_session(&state, jar, &request.code, &pending).await?;
    Ok((jar, Json(identity)))
}

/// Returns the session identity, or `null` without a session.
pub async fn current_identity(
    OptionalSession(session): OptionalSession,
) -> Json<CurrentIdentityResponse> {
    Json(CurrentIdentityResponse {
        identity: session.map(|s| s.identity().clone()),
    })
}

/// Resolves the session identity to its application user.
pub async fn me(
    State(state): State<Arc<AppState>>,
    RequireSession(session): RequireSession,
) -> Result<Json<AppUserResponse>, ApiError> {
    let user = state
        .access
        .resolve_application_user(session.identity())
        .await?;
    Ok(Json(AppUserResponse {
        app_user: Some(user),
    }))
}

/// Public view of an invite.
pub async fn invite(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<InvitePresentation>, ApiError> {
    let presentation = state.access.present_invite(&token, Utc::now()).await?;
    Ok(Json(presentation))
}

/// Accepts an invite for the session identity.
pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    RequireSession(session): RequireSession,
    Path(token): Path<String>,
    Json(request): Json<AcceptInviteRequest>,
) -> Result<Json<AppUserResponse>, ApiError> {
    let user = state
        .access
        .accept_invite(
            &token,
            session.identity(),
            request.validated_corporate_email.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok(Json(AppUserResponse {
        app_user: Some(user),
    }))
}

/// Ends the session. Always succeeds.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (end_session(&state, jar).await, StatusCode::NO_CONTENT)
}

/// Query parameters for the browser login.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Invite to accept once the provider round-trip completes.
    invite: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let LoginInitiation {
        authorization_url,
        pending,
    } = state.provider.authorization_url();

    let mut jar = jar.add(auth_state_cookie(&state, &pending)?);
    if let Some(token) = query.invite.filter(|t| !t.trim().is_empty()) {
        jar = jar.add(round_trip_cookie(
            PENDING_INVITE_COOKIE,
            token,
            state.session_config.secure_cookies,
        ));
    }

    Ok((jar, Redirect::to(&authorization_url)))
}

/// Query parameters for the OIDC callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let Some(code) = query.code else {
        return Redirect::to("/login?erro=cancelado").into_response();
    };
    let pending = match pending_login(&jar) {
        Ok(pending) => pending,
        Err(e) => {
            warn!(error = %e, "callback without pending login");
            return Redirect::to("/login?erro=sessao").into_response();
        }
    };
    if query.state.as_deref() != Some(pending.csrf_token.as_str()) {
        warn!("CSRF state mismatch on callback");
        return Redirect::to("/login?erro=sessao").into_response();
    }

    let (jar, identity) = match establish_session(&state, jar, &code, &pending).await {
        Ok(established) => established,
        Err(e) => {
            warn!(error = %e, "code exchange failed");
            return Redirect::to("/login?erro=codigo").into_response();
        }
    };

    let (jar, target) = settle_pending_invite(&state, jar, &identity).await;
    (jar, Redirect::to(&target)).into_response()
}

/// Accepts the invite held in the pending cookie, if any.
///
/// The cookie is cleared on every definitive outcome and kept when the
/// outcome could not be determined. Returns where to send the browser.
async fn settle_pending_invite(
    state: &AppState,
    jar: CookieJar,
    identity: &Identity,
) -> (CookieJar, String) {
    let Some(token) = jar.get(PENDING_INVITE_COOKIE).map(|c| c.value().to_string()) else {
        return (jar, "/".to_string());
    };

    match state
        .access
        .accept_invite(&token, identity, None, Utc::now())
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, "pending invite accepted");
            (jar.add(removal(PENDING_INVITE_COOKIE)), "/".to_string())
        }
        Err(InviteError::ValidationMismatch { .. }) => (
            jar.add(removal(PENDING_INVITE_COOKIE)),
            format!("/convite/{token}"),
        ),
        Err(InviteError::Unavailable { details }) => {
            warn!(details = %details, "pending invite kept, storage unavailable");
            (jar, "/".to_string())
        }
        Err(e) => {
            info!(reason = %e, "pending invite discarded");
            (jar.add(removal(PENDING_INVITE_COOKIE)), "/".to_string())
        }
    }
}

/// Logs out and returns to the login page.
pub async fn logout_redirect(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> impl IntoResponse {
    (end_session(&state, jar).await, Redirect::to("/login"))
}

/// Catalogue entries sharing a group.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    pub group_name: &'static str,
    pub permissions: Vec<Permission>,
}

/// The permission catalogue, grouped for display.
pub async fn permissions(_: RequireAppUser) -> Json<Vec<PermissionGroup>> {
    Json(
        permission_groups()
            .into_iter()
            .map(|(group_name, permissions)| PermissionGroup {
                group_name,
                permissions,
            })
            .collect(),
    )
}

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _: RequirePermission<ViewUsers>,
) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.access.list_roles().await?))
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    _: RequirePermission<ManageRoles>,
    Json(input): Json<RoleInput>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let role = state.access.create_role(input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    _: RequirePermission<ManageRoles>,
    Path(id): Path<String>,
    Json(input): Json<RoleInput>,
) -> Result<Json<Role>, ApiError> {
    let role = state
        .access
        .update_role(parse_path_id(&id)?, input)
        .await?;
    Ok(Json(role))
}

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    _: RequirePermission<ManageRoles>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.access.delete_role(parse_path_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _: RequirePermission<ViewUsers>,
) -> Result<Json<Vec<ApplicationUser>>, ApiError> {
    Ok(Json(state.access.list_users().await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    RequirePermission { user: actor, .. }: RequirePermission<ManageUsers>,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<ApplicationUser>, ApiError> {
    let user = state
        .access
        .update_user(&actor, parse_path_id(&id)?, update, Utc::now())
        .await?;
    Ok(Json(user))
}

/// Response to `POST /api/invites`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInvite {
    #[serde(flatten)]
    pub invite: InviteToken,
    /// Path of the page the invitee opens.
    pub invite_path: String,
}

pub async fn create_invite(
    State(state): State<Arc<AppState>>,
    RequirePermission { user: inviter, .. }: RequirePermission<InviteUsers>,
    Json(request): Json<NewInvite>,
) -> Result<(StatusCode, Json<CreatedInvite>), ApiError> {
    let invite = state
        .access
        .create_invite(&inviter, request, Utc::now())
        .await?;
    let invite_path = format!("/convite/{}", invite.token);
    Ok((
        StatusCode::CREATED,
        Json(CreatedInvite {
            invite,
            invite_path,
        }),
    ))
}
