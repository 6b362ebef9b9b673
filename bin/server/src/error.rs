//! Domain errors mapped onto HTTP responses.
//!
//! Every JSON error body has the shape of [`ErrorBody`]: a user-facing
//! `error` message plus flags the client branches on (`unauthorized`,
//! `invalidCode`, `requiresValidation`, `expired`, `alreadyUsed`).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use collectdesk_access::{
    AuthenticationError, AuthorizationError, InviteError, RoleError, UserAdminError,
};
use collectdesk_gate::{DenialReason, ErrorBody};
use leptos::server_fn::error::ServerFnError;
use std::fmt;

/// Errors returned by the JSON API.
#[derive(Debug)]
pub enum ApiError {
    /// No valid session cookie.
    NotAuthenticated,
    /// The OAuth code exchange failed.
    InvalidCode { reason: String },
    /// The OAuth provider could not be reached.
    Provider { reason: String },
    /// Identity resolution or a permission check failed.
    Authorization(AuthorizationError),
    Invite(InviteError),
    Role(RoleError),
    UserAdmin(UserAdminError),
    /// Malformed request.
    BadRequest { details: String },
    /// Anything else. Details are logged, never returned.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::InvalidCode { reason } => write!(f, "invalid authorization code: {reason}"),
            Self::Provider { reason } => write!(f, "identity provider error: {reason}"),
            Self::Authorization(e) => write!(f, "{e}"),
            Self::Invite(e) => write!(f, "{e}"),
            Self::Role(e) => write!(f, "{e}"),
            Self::UserAdmin(e) => write!(f, "{e}"),
            Self::BadRequest { details } => write!(f, "bad request: {details}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthenticationError> for ApiError {
    fn from(err: AuthenticationError) -> Self {
        if err.is_invalid_code() {
            Self::InvalidCode {
                reason: err.to_string(),
            }
        } else {
            Self::Provider {
                reason: err.to_string(),
            }
        }
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        Self::Authorization(err)
    }
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        Self::Invite(err)
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        Self::Role(err)
    }
}

impl From<UserAdminError> for ApiError {
    fn from(err: UserAdminError) -> Self {
        Self::UserAdmin(err)
    }
}

const UNAVAILABLE_MESSAGE: &str = "Serviço temporariamente indisponível. Tente novamente.";

fn unavailable(details: &str) -> (StatusCode, ErrorBody) {
    tracing::error!(details, "backing store unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        ErrorBody::new(UNAVAILABLE_MESSAGE),
    )
}

impl ApiError {
    /// Status code and body for this error.
    fn parts(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, ErrorBody::new("Não autenticado")),
            Self::InvalidCode { reason } => {
                tracing::warn!(reason = %reason, "authorization code rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorBody {
                        invalid_code: true,
                        ..ErrorBody::new("Código de autorização inválido. Faça login novamente.")
                    },
                )
            }
            Self::Provider { reason } => {
                tracing::error!(reason = %reason, "identity provider failure");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new("Provedor de identidade indisponível"),
                )
            }
            Self::Authorization(err) => authorization_parts(err),
            Self::Invite(err) => invite_parts(err),
            Self::Role(err) => role_parts(err),
            Self::UserAdmin(err) => user_admin_parts(err),
            Self::BadRequest { details } => {
                (StatusCode::BAD_REQUEST, ErrorBody::new(details.clone()))
            }
            Self::Internal { details } => {
                tracing::error!(details = %details, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Erro interno"),
                )
            }
        }
    }
}

fn authorization_parts(err: &AuthorizationError) -> (StatusCode, ErrorBody) {
    match err {
        AuthorizationError::NotRegistered { .. } | AuthorizationError::Blocked { .. } => {
            let reason = DenialReason::from_error(err).map(|r| r.as_str().to_string());
            (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    unauthorized: true,
                    reason,
                    ..ErrorBody::new("Acesso negado")
                },
            )
        }
        AuthorizationError::PermissionDenied { permission } => {
            tracing::debug!(permission = %permission, "permission denied");
            (
                StatusCode::FORBIDDEN,
                ErrorBody::new("Você não tem permissão para esta ação"),
            )
        }
        AuthorizationError::Unavailable { details } => unavailable(details),
    }
}

fn invite_parts(err: &InviteError) -> (StatusCode, ErrorBody) {
    match err {
        InviteError::NotFound => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("Convite não encontrado"),
        ),
        InviteError::Expired => (
            StatusCode::GONE,
            ErrorBody {
                expired: true,
                ..ErrorBody::new("Este convite expirou")
            },
        ),
        InviteError::AlreadyUsed => (
            StatusCode::GONE,
            ErrorBody {
                already_used: true,
                ..ErrorBody::new("Este convite já foi utilizado")
            },
        ),
        InviteError::ValidationMismatch {
            corporate_email_hint,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorBody {
                requires_validation: true,
                corporate_email_hint: corporate_email_hint.clone(),
                ..ErrorBody::new("O e-mail corporativo não corresponde ao convite")
            },
        ),
        InviteError::RoleNotFound => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("Função do convite não encontrada"),
        ),
        InviteError::IdentityRejected { reason } => (
            StatusCode::FORBIDDEN,
            ErrorBody {
                unauthorized: true,
                reason: Some(reason.as_str().to_string()),
                ..ErrorBody::new("Esta conta não pode aceitar o convite")
            },
        ),
        InviteError::InvalidRequest { details } => {
            (StatusCode::BAD_REQUEST, ErrorBody::new(details.clone()))
        }
        InviteError::PermissionDenied => (
            StatusCode::FORBIDDEN,
            ErrorBody::new("Você não tem permissão para convidar usuários"),
        ),
        InviteError::Unavailable { details } => unavailable(details),
    }
}

fn role_parts(err: &RoleError) -> (StatusCode, ErrorBody) {
    match err {
        RoleError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("Função não encontrada"),
        ),
        RoleError::UnknownPermission { .. } | RoleError::InvalidName => {
            (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string()))
        }
        RoleError::SystemRole { .. } | RoleError::InUse { .. } | RoleError::DuplicateName { .. } => {
            (StatusCode::CONFLICT, ErrorBody::new(err.to_string()))
        }
        RoleError::Unavailable { details } => unavailable(details),
    }
}

fn user_admin_parts(err: &UserAdminError) -> (StatusCode, ErrorBody) {
    match err {
        UserAdminError::NotFound { .. } | UserAdminError::RoleNotFound { .. } => {
            (StatusCode::NOT_FOUND, ErrorBody::new(err.to_string()))
        }
        UserAdminError::OwnerProtected | UserAdminError::SelfDeactivation => {
            (StatusCode::CONFLICT, ErrorBody::new(err.to_string()))
        }
        UserAdminError::Unavailable { details } => unavailable(details),
    }
}

impl ApiError {
    /// Convert to a user-safe ServerFnError.
    pub fn into_server_error(self) -> ServerFnError {
        let (_, body) = self.parts();
        ServerFnError::new(body.error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}
