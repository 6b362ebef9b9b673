//! `AuthApi` over HTTP with reqwest.
//!
//! Response interpretation lives in plain functions over `(status, body)` so
//! the rules (for example "a 200 without `appUser` is a denial") are tested
//! without a server.

use async_trait::async_trait;
use collectdesk_access::{ApplicationUser, Identity, InviteError, InvitePresentation};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::api::{
    AcceptInviteRequest, AppUserResponse, AuthApi, AuthorizationOutcome, CreateSessionRequest,
    CurrentIdentityResponse, DenialReason, ErrorBody, RedirectUrlResponse,
};
use crate::error::ClientError;

/// Client for the dashboard REST surface.
///
/// The session cookie is kept in the client's cookie store.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Creates a client rooted at `base_url` (e.g. `http://127.0.0.1:3000`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(network)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn network(err: reqwest::Error) -> ClientError {
    ClientError::Network {
        details: err.to_string(),
    }
}

async fn read(response: Response) -> Result<(u16, String), ClientError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network)?;
    Ok((status, body))
}

fn parse<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Unexpected {
        status,
        details: e.to_string(),
    })
}

fn error_body(body: &str) -> ErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}

/// Errors every endpoint shares.
///
/// Any server-side failure (5xx) or throttling (429) leaves the outcome
/// undetermined.
fn common_error(status: u16, body: &str) -> ClientError {
    match status {
        401 => ClientError::Unauthenticated,
        429 | 500..=599 => ClientError::ServiceUnavailable,
        _ => ClientError::Unexpected {
            status,
            details: error_body(body).error,
        },
    }
}

/// Interprets `POST /api/sessions`.
pub fn session_response(status: u16, body: &str) -> Result<Identity, ClientError> {
    match status {
        200 => parse(status, body),
        400 | 401 => Err(ClientError::InvalidCode),
        _ => Err(common_error(status, body)),
    }
}

/// Interprets `GET /api/sessions/current`.
pub fn current_identity_response(
    status: u16,
    body: &str,
) -> Result<Option<Identity>, ClientError> {
    match status {
        200 => parse::<CurrentIdentityResponse>(status, body).map(|r| r.identity),
        401 => Ok(None),
        _ => Err(common_error(status, body)),
    }
}

/// Interprets `GET /api/users/me`.
///
/// A 200 without `appUser` is a denial, never an authorization.
pub fn current_user_response(
    status: u16,
    body: &str,
) -> Result<AuthorizationOutcome, ClientError> {
    match status {
        200 => {
            let response: AppUserResponse = parse(status, body)?;
            Ok(match response.app_user {
                Some(user) => AuthorizationOutcome::Authorized(user),
                None => AuthorizationOutcome::Denied(DenialReason::Unspecified),
            })
        }
        403 => {
            let body = error_body(body);
            Ok(AuthorizationOutcome::Denied(DenialReason::from_wire(
                body.reason.as_deref(),
            )))
        }
        _ => Err(common_error(status, body)),
    }
}

/// Maps an invite error body to the domain error.
fn invite_error(status: u16, body: &str) -> ClientError {
    let parsed = error_body(body);
    match status {
        404 => ClientError::Invite(InviteError::NotFound),
        410 if parsed.already_used => ClientError::Invite(InviteError::AlreadyUsed),
        410 => ClientError::Invite(InviteError::Expired),
        422 if parsed.requires_validation => {
            ClientError::Invite(InviteError::ValidationMismatch {
                corporate_email_hint: parsed.corporate_email_hint,
            })
        }
        403 if parsed.unauthorized => match DenialReason::from_wire(parsed.reason.as_deref()) {
            DenialReason::Blocked(reason) => {
                ClientError::Invite(InviteError::IdentityRejected { reason })
            }
            _ => common_error(status, body),
        },
        _ => common_error(status, body),
    }
}

/// Interprets `GET /api/invite/:token`.
pub fn invite_response(status: u16, body: &str) -> Result<InvitePresentation, ClientError> {
    match status {
        200 => parse(status, body),
        _ => Err(invite_error(status, body)),
    }
}

/// Interprets `POST /api/invite/:token/accept`.
pub fn accept_response(status: u16, body: &str) -> Result<ApplicationUser, ClientError> {
    match status {
        200 => {
            let response: AppUserResponse = parse(status, body)?;
            response.app_user.ok_or_else(|| ClientError::Unexpected {
                status,
                details: "accepted invite without appUser".to_string(),
            })
        }
        _ => Err(invite_error(status, body)),
    }
}

#[async_trait(?Send)]
impl AuthApi for HttpAuthApi {
    async fn redirect_url(&self, provider: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/oauth/{provider}/redirect_url")))
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        if status != 200 {
            return Err(common_error(status, &body));
        }
        parse::<RedirectUrlResponse>(status, &body).map(|r| r.redirect_url)
    }

    #[instrument(skip(self, code))]
    async fn create_session(&self, code: &str) -> Result<Identity, ClientError> {
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .json(&CreateSessionRequest {
                code: code.to_string(),
                state: None,
            })
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        session_response(status, &body)
    }

    async fn current_identity(&self) -> Result<Option<Identity>, ClientError> {
        let response = self
            .client
            .get(self.url("/api/sessions/current"))
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        current_identity_response(status, &body)
    }

    async fn current_user(&self) -> Result<AuthorizationOutcome, ClientError> {
        let response = self
            .client
            .get(self.url("/api/users/me"))
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        current_user_response(status, &body)
    }

    async fn invite(&self, token: &str) -> Result<InvitePresentation, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/invite/{token}")))
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        invite_response(status, &body)
    }

    #[instrument(skip(self, token, validated_corporate_email))]
    async fn accept_invite(
        &self,
        token: &str,
        validated_corporate_email: Option<&str>,
    ) -> Result<ApplicationUser, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/invite/{token}/accept")))
            .json(&AcceptInviteRequest {
                validated_corporate_email: validated_corporate_email.map(str::to_string),
            })
            .send()
            .await
            .map_err(network)?;
        let (status, body) = read(response).await?;
        accept_response(status, &body)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/logout"))
            .send()
            .await
            .map_err(network)?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(ClientError::Unexpected {
                status,
                details: "logout failed".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collectdesk_access::BlockReason;

    #[test]
    fn me_without_app_user_is_denied() {
        assert_eq!(
            current_user_response(200, r#"{"appUser":null}"#),
            Ok(AuthorizationOutcome::Denied(DenialReason::Unspecified))
        );
        assert_eq!(
            current_user_response(200, "{}"),
            Ok(AuthorizationOutcome::Denied(DenialReason::Unspecified))
        );
    }

    #[test]
    fn me_forbidden_keeps_reason() {
        assert_eq!(
            current_user_response(
                403,
                r#"{"error":"Acesso negado","unauthorized":true,"reason":"notRegistered"}"#
            ),
            Ok(AuthorizationOutcome::Denied(DenialReason::NotRegistered))
        );
        assert_eq!(
            current_user_response(403, r#"{"error":"x","unauthorized":true,"reason":"inactive"}"#),
            Ok(AuthorizationOutcome::Denied(DenialReason::Blocked(
                BlockReason::Inactive
            )))
        );
        assert_eq!(
            current_user_response(403, "not json"),
            Ok(AuthorizationOutcome::Denied(DenialReason::Unspecified))
        );
    }

    #[test]
    fn me_server_trouble_is_not_a_denial() {
        assert_eq!(
            current_user_response(503, r#"{"error":"indisponível"}"#),
            Err(ClientError::ServiceUnavailable)
        );
        assert!(current_user_response(503, "").unwrap_err().is_transient());
        assert_eq!(
            current_user_response(500, r#"{"error":"Erro interno"}"#),
            Err(ClientError::ServiceUnavailable)
        );
        assert!(current_user_response(200, "garbage").is_err());
    }

    #[test]
    fn missing_session_reads_as_none() {
        assert_eq!(
            current_identity_response(200, r#"{"identity":null}"#),
            Ok(None)
        );
        assert_eq!(current_identity_response(401, ""), Ok(None));
    }

    #[test]
    fn rejected_code_is_invalid_code() {
        assert_eq!(
            session_response(401, r#"{"error":"x","invalidCode":true}"#),
            Err(ClientError::InvalidCode)
        );
    }

    #[test]
    fn invite_errors_map_to_domain() {
        assert_eq!(
            accept_response(404, r#"{"error":"x"}"#),
            Err(ClientError::Invite(InviteError::NotFound))
        );
        assert_eq!(
            accept_response(410, r#"{"error":"x","expired":true}"#),
            Err(ClientError::Invite(InviteError::Expired))
        );
        assert_eq!(
            accept_response(410, r#"{"error":"x","alreadyUsed":true}"#),
            Err(ClientError::Invite(InviteError::AlreadyUsed))
        );
        assert_eq!(
            accept_response(
                422,
                r#"{"error":"x","requiresValidation":true,"corporateEmailHint":"***@empresa.com.br"}"#
            ),
            Err(ClientError::Invite(InviteError::ValidationMismatch {
                corporate_email_hint: Some("***@empresa.com.br".to_string())
            }))
        );
        assert_eq!(
            accept_response(403, r#"{"error":"x","unauthorized":true,"reason":"unverifiedEmail"}"#),
            Err(ClientError::Invite(InviteError::IdentityRejected {
                reason: BlockReason::UnverifiedEmail
            }))
        );
        assert_eq!(accept_response(401, "{}"), Err(ClientError::Unauthenticated));
    }

    #[test]
    fn accept_server_failures_are_transient() {
        for status in [429, 500, 501, 503, 599] {
            let err = accept_response(status, r#"{"error":"Erro interno"}"#).unwrap_err();
            assert_eq!(err, ClientError::ServiceUnavailable, "status {status}");
            assert!(err.is_transient());
        }
        assert!(matches!(
            accept_response(418, "{}"),
            Err(ClientError::Unexpected { status: 418, .. })
        ));
    }
}
