//! The REST contract between the dashboard and its backend.
//!
//! Wire types here are shared by the server (which produces them) and the
//! clients (which consume them), so both sides agree on field names.

use async_trait::async_trait;
use collectdesk_access::{
    ApplicationUser, AuthorizationError, BlockReason, Identity, InvitePresentation,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ClientError;

/// Why an authenticated identity was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "reason")]
pub enum DenialReason {
    /// No application user exists; access can be requested.
    NotRegistered,
    /// A record exists but refuses the identity.
    Blocked(BlockReason),
    /// The backend answered without an application user and without a reason.
    Unspecified,
}

impl DenialReason {
    /// Wire name used in the `reason` field of a 403 body.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "notRegistered",
            Self::Blocked(reason) => reason.as_str(),
            Self::Unspecified => "unspecified",
        }
    }

    /// Parses the `reason` field of a 403 body. Unknown or missing reasons
    /// are still denials.
    #[must_use]
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("notRegistered") => Self::NotRegistered,
            Some("inactive") => Self::Blocked(BlockReason::Inactive),
            Some("pendingActivation") => Self::Blocked(BlockReason::PendingActivation),
            Some("unverifiedEmail") => Self::Blocked(BlockReason::UnverifiedEmail),
            Some("subjectMismatch") => Self::Blocked(BlockReason::SubjectMismatch),
            Some("roleMissing") => Self::Blocked(BlockReason::RoleMissing),
            _ => Self::Unspecified,
        }
    }

    /// The denial carried by a lookup error, or `None` when the error does
    /// not decide the outcome.
    #[must_use]
    pub fn from_error(err: &AuthorizationError) -> Option<Self> {
        match err {
            AuthorizationError::NotRegistered { .. } => Some(Self::NotRegistered),
            AuthorizationError::Blocked { reason, .. } => Some(Self::Blocked(*reason)),
            AuthorizationError::PermissionDenied { .. } => Some(Self::Unspecified),
            AuthorizationError::Unavailable { .. } => None,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definitive answer of the authorization lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "value")]
pub enum AuthorizationOutcome {
    Authorized(ApplicationUser),
    Denied(DenialReason),
}

/// Combined session and authorization status, as rendered server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "value")]
pub enum AccessStatus {
    /// No session.
    Anonymous,
    Authorized(ApplicationUser),
    Denied(DenialReason),
    /// The backend could not decide.
    Undetermined,
}

/// `GET /api/oauth/<provider>/redirect_url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectUrlResponse {
    pub redirect_url: String,
}

/// `POST /api/sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// `GET /api/sessions/current`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIdentityResponse {
    pub identity: Option<Identity>,
}

/// `GET /api/users/me` and `POST /api/invite/:token/accept` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUserResponse {
    #[serde(default)]
    pub app_user: Option<ApplicationUser>,
}

/// `POST /api/invite/:token/accept`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    #[serde(default)]
    pub validated_corporate_email: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unauthorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub invalid_code: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corporate_email_hint: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expired: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub already_used: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}

/// The backend calls the gate depends on.
///
/// Futures are not required to be `Send` so browser implementations fit.
#[async_trait(?Send)]
pub trait AuthApi {
    /// URL to send the browser to for the provider's login page.
    async fn redirect_url(&self, provider: &str) -> Result<String, ClientError>;

    /// Exchanges an authorization code for a session.
    async fn create_session(&self, code: &str) -> Result<Identity, ClientError>;

    /// The current identity, or `None` without a session.
    async fn current_identity(&self) -> Result<Option<Identity>, ClientError>;

    /// Resolves the current identity to an application user.
    async fn current_user(&self) -> Result<AuthorizationOutcome, ClientError>;

    async fn invite(&self, token: &str) -> Result<InvitePresentation, ClientError>;

    async fn accept_invite(
        &self,
        token: &str,
        validated_corporate_email: Option<&str>,
    ) -> Result<ApplicationUser, ClientError>;

    /// Invalidates the server session. Callers treat this as best-effort.
    async fn logout(&self) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_reasons_round_trip() {
        for reason in [
            DenialReason::NotRegistered,
            DenialReason::Blocked(BlockReason::Inactive),
            DenialReason::Blocked(BlockReason::PendingActivation),
            DenialReason::Blocked(BlockReason::UnverifiedEmail),
            DenialReason::Blocked(BlockReason::SubjectMismatch),
            DenialReason::Blocked(BlockReason::RoleMissing),
        ] {
            assert_eq!(DenialReason::from_wire(Some(reason.as_str())), reason);
        }
        assert_eq!(DenialReason::from_wire(None), DenialReason::Unspecified);
        assert_eq!(
            DenialReason::from_wire(Some("somethingNew")),
            DenialReason::Unspecified
        );
    }

    #[test]
    fn unavailable_error_has_no_denial() {
        let err = AuthorizationError::Unavailable {
            details: "db down".to_string(),
        };
        assert_eq!(DenialReason::from_error(&err), None);
        let err = AuthorizationError::NotRegistered {
            email: "a@x.com".to_string(),
        };
        assert_eq!(
            DenialReason::from_error(&err),
            Some(DenialReason::NotRegistered)
        );
    }

    #[test]
    fn error_body_omits_unset_flags() {
        let mut body = ErrorBody::new("Acesso negado");
        body.unauthorized = true;
        body.reason = Some("notRegistered".to_string());
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["unauthorized"], true);
        assert_eq!(json["reason"], "notRegistered");
        assert!(json.get("requiresValidation").is_none());
        assert!(json.get("expired").is_none());
    }

    #[test]
    fn accept_request_body_is_optional() {
        let request: AcceptInviteRequest = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(request.validated_corporate_email, None);
        let request: AcceptInviteRequest =
            serde_json::from_str(r#"{"validatedCorporateEmail":"a@empresa.com.br"}"#)
                .expect("deserialize");
        assert_eq!(
            request.validated_corporate_email.as_deref(),
            Some("a@empresa.com.br")
        );
    }
}
