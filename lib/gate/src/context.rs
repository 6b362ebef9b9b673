//! The authorization context handed to the UI.
//!
//! An `AuthContext` is constructed once at app mount with an explicit
//! [`AuthApi`] and [`PendingInviteStore`], then passed down the route tree.
//! It owns the [`GateMachine`] and performs the calls in causal order.

use collectdesk_access::{ApplicationUser, Identity, InviteError, PermissionCheck};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::api::AuthApi;
use crate::error::ClientError;
use crate::gate::{GateMachine, GateState};
use crate::pending::PendingInviteStore;

/// Result of settling a pending invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteSettlement {
    /// The invite was consumed for the current identity.
    Accepted(ApplicationUser),
    /// The invite needs a corporate email; continue on the invite page.
    NeedsValidation {
        token: String,
        corporate_email_hint: Option<String>,
    },
    /// The invite can never succeed (expired, used, unknown).
    Rejected(ClientError),
    /// Nothing was decided; the token is kept for a later attempt.
    Deferred(ClientError),
}

pub struct AuthContext<A, P> {
    api: A,
    pending: P,
    machine: Mutex<GateMachine>,
}

impl<A: AuthApi, P: PendingInviteStore> AuthContext<A, P> {
    #[must_use]
    pub fn new(api: A, pending: P) -> Self {
        Self {
            api,
            pending,
            machine: Mutex::new(GateMachine::new()),
        }
    }

    fn machine(&self) -> MutexGuard<'_, GateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Current render state.
    #[must_use]
    pub fn state(&self) -> GateState {
        self.machine().state()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.machine().identity().cloned()
    }

    #[must_use]
    pub fn user(&self) -> Option<ApplicationUser> {
        self.machine().user().cloned()
    }

    #[must_use]
    pub fn has_permission(&self, code: &str) -> bool {
        self.machine().has_permission(code)
    }

    #[must_use]
    pub fn has_any_permission(&self, codes: &[&str]) -> bool {
        self.machine()
            .user()
            .is_some_and(|u| u.has_any_permission(codes))
    }

    #[must_use]
    pub fn has_all_permissions(&self, codes: &[&str]) -> bool {
        self.machine()
            .user()
            .is_some_and(|u| u.has_all_permissions(codes))
    }

    /// Resolves the session, then (only if there is an identity) the
    /// application user. Results that arrive after a newer refresh or a
    /// logout are discarded.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> GateState {
        let ticket = self.machine().begin_session();
        let identity = self.api.current_identity().await;

        let authorization = {
            let mut machine = self.machine();
            if !machine.resolve_session(ticket, identity) {
                return machine.state();
            }
            machine.begin_authorization(&ticket)
        };

        if let Some(auth_ticket) = authorization {
            let outcome = self.api.current_user().await;
            self.machine().resolve_authorization(auth_ticket, outcome);
        }
        self.state()
    }

    /// Login URL for the provider.
    ///
    /// # Errors
    ///
    /// Propagates the API error.
    pub async fn login_url(&self, provider: &str) -> Result<String, ClientError> {
        self.api.redirect_url(provider).await
    }

    /// Exchanges the OAuth code and refreshes the gate.
    ///
    /// # Errors
    ///
    /// `InvalidCode` when the provider rejected the code.
    #[instrument(skip(self, code))]
    pub async fn complete_login(&self, code: &str) -> Result<GateState, ClientError> {
        let identity = self.api.create_session(code).await?;
        info!(email = %identity.email(), "session established");
        Ok(self.refresh().await)
    }

    /// Logs out. The server call is best-effort: the gate always ends up
    /// redirecting to login.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> GateState {
        if let Err(err) = self.api.logout().await {
            warn!(error = %err, "logout call failed; continuing");
        }
        let mut machine = self.machine();
        machine.sign_out();
        machine.state()
    }

    /// Remembers an invite token across the provider round-trip.
    pub fn remember_invite(&self, token: &str) {
        self.pending.save(token);
    }

    /// Tries to accept the pending invite, if any.
    ///
    /// The token is cleared on every definitive outcome and kept only when
    /// nothing was decided (no session yet or a transient failure), so it is
    /// never retried on every page load.
    #[instrument(skip(self))]
    pub async fn settle_pending_invite(&self) -> Option<InviteSettlement> {
        let token = self.pending.peek()?;
        Some(self.settle(token, None).await)
    }

    /// Accepts an invite from the invite page, optionally with a corporate
    /// email.
    #[instrument(skip(self, token, validated_corporate_email))]
    pub async fn accept_invite(
        &self,
        token: &str,
        validated_corporate_email: Option<&str>,
    ) -> InviteSettlement {
        self.settle(token.to_string(), validated_corporate_email)
            .await
    }

    async fn settle(
        &self,
        token: String,
        validated_corporate_email: Option<&str>,
    ) -> InviteSettlement {
        match self
            .api
            .accept_invite(&token, validated_corporate_email)
            .await
        {
            Ok(user) => {
                self.pending.clear();
                info!(user_id = %user.id, "invite accepted");
                self.refresh().await;
                InviteSettlement::Accepted(user)
            }
            Err(ClientError::Invite(InviteError::ValidationMismatch {
                corporate_email_hint,
            })) => {
                self.pending.clear();
                InviteSettlement::NeedsValidation {
                    token,
                    corporate_email_hint,
                }
            }
            Err(err) if err.is_transient() || err == ClientError::Unauthenticated => {
                debug!(error = %err, "invite not settled; keeping token");
                InviteSettlement::Deferred(err)
            }
            Err(err) => {
                self.pending.clear();
                info!(error = %err, "invite rejected");
                InviteSettlement::Rejected(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthorizationOutcome, DenialReason};
    use crate::gate::LoadingStage;
    use crate::pending::MemoryPendingInvite;
    use async_trait::async_trait;
    use chrono::Utc;
    use collectdesk_access::{InvitePresentation, system_roles};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn operator(email: &str) -> ApplicationUser {
        let roles = system_roles();
        let role = roles.iter().find(|r| r.name == "Operador").expect("role");
        ApplicationUser::new(email, "Op".to_string(), role, Utc::now())
    }

    struct FakeApi {
        identity: Mutex<Result<Option<Identity>, ClientError>>,
        outcome: Mutex<Result<AuthorizationOutcome, ClientError>>,
        hold_outcome: Mutex<Option<oneshot::Receiver<()>>>,
        accept: Mutex<Vec<Result<ApplicationUser, ClientError>>>,
        logout_fails: bool,
        user_calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(identity: Option<&str>, outcome: AuthorizationOutcome) -> Self {
            Self {
                identity: Mutex::new(Ok(identity
                    .map(|e| Identity::new(format!("sub-{e}"), e.to_string())))),
                outcome: Mutex::new(Ok(outcome)),
                hold_outcome: Mutex::new(None),
                accept: Mutex::new(Vec::new()),
                logout_fails: false,
                user_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl AuthApi for FakeApi {
        async fn redirect_url(&self, provider: &str) -> Result<String, ClientError> {
            Ok(format!("https://login.example.com/{provider}"))
        }

        async fn create_session(&self, code: &str) -> Result<Identity, ClientError> {
            if code == "good" {
                Ok(Identity::new("s".to_string(), "op@x.com".to_string()))
            } else {
                Err(ClientError::InvalidCode)
            }
        }

        async fn current_identity(&self) -> Result<Option<Identity>, ClientError> {
            self.identity.lock().expect("lock").clone()
        }

        async fn current_user(&self) -> Result<AuthorizationOutcome, ClientError> {
            self.user_calls.fetch_add(1, Ordering::SeqCst);
            let hold = self.hold_outcome.lock().expect("lock").take();
            if let Some(rx) = hold {
                let _ = rx.await;
            }
            self.outcome.lock().expect("lock").clone()
        }

        async fn invite(&self, _token: &str) -> Result<InvitePresentation, ClientError> {
            Err(ClientError::Invite(InviteError::NotFound))
        }

        async fn accept_invite(
            &self,
            _token: &str,
            _validated_corporate_email: Option<&str>,
        ) -> Result<ApplicationUser, ClientError> {
            self.accept.lock().expect("lock").remove(0)
        }

        async fn logout(&self) -> Result<(), ClientError> {
            if self.logout_fails {
                Err(ClientError::Network {
                    details: "offline".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn no_session_skips_authorization() {
        let api = FakeApi::new(None, AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        assert_eq!(ctx.refresh().await, GateState::RedirectToLogin);
        assert_eq!(ctx.api().user_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistered_identity_renders_denied() {
        let api = FakeApi::new(
            Some("a@x.com"),
            AuthorizationOutcome::Denied(DenialReason::NotRegistered),
        );
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        assert_eq!(
            ctx.refresh().await,
            GateState::Denied(DenialReason::NotRegistered)
        );
        assert!(!ctx.has_permission("cases.view"));
    }

    #[tokio::test]
    async fn authorized_identity_renders_content() {
        let op = operator("op@x.com");
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Authorized(op.clone()));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        assert_eq!(ctx.refresh().await, GateState::Content(op));
        assert!(ctx.has_permission("cases.view"));
        assert!(ctx.has_any_permission(&["users.manage", "cases.edit"]));
        assert!(!ctx.has_all_permissions(&["users.manage", "cases.edit"]));
    }

    #[tokio::test]
    async fn transient_failure_keeps_loading() {
        let api = FakeApi::new(
            Some("op@x.com"),
            AuthorizationOutcome::Denied(DenialReason::NotRegistered),
        );
        *api.outcome.lock().expect("lock") = Err(ClientError::ServiceUnavailable);
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        assert_eq!(
            ctx.refresh().await,
            GateState::Loading(LoadingStage::Unreachable)
        );
    }

    #[tokio::test]
    async fn logout_mid_lookup_discards_result() {
        let op = operator("op@x.com");
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Authorized(op));
        let (release, hold) = oneshot::channel();
        *api.hold_outcome.lock().expect("lock") = Some(hold);
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());

        let (refreshed, logged_out) = tokio::join!(ctx.refresh(), async {
            let state = ctx.logout().await;
            let _ = release.send(());
            state
        });
        assert_eq!(logged_out, GateState::RedirectToLogin);
        assert_eq!(refreshed, GateState::RedirectToLogin);
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn logout_is_best_effort() {
        let mut api = FakeApi::new(
            Some("op@x.com"),
            AuthorizationOutcome::Authorized(operator("op@x.com")),
        );
        api.logout_fails = true;
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.refresh().await;
        assert_eq!(ctx.logout().await, GateState::RedirectToLogin);
    }

    #[tokio::test]
    async fn bad_code_is_invalid_code() {
        let api = FakeApi::new(None, AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        assert_eq!(
            ctx.complete_login("bad").await.unwrap_err(),
            ClientError::InvalidCode
        );
    }

    #[tokio::test]
    async fn pending_invite_cleared_once_accepted() {
        let op = operator("op@x.com");
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Authorized(op.clone()));
        api.accept.lock().expect("lock").push(Ok(op.clone()));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.remember_invite("tok");

        assert_eq!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Accepted(op.clone()))
        );
        assert_eq!(ctx.state(), GateState::Content(op));
        // nothing left to retry on the next page load
        assert_eq!(ctx.settle_pending_invite().await, None);
    }

    #[tokio::test]
    async fn pending_invite_cleared_on_terminal_error() {
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        api.accept
            .lock()
            .expect("lock")
            .push(Err(ClientError::Invite(InviteError::Expired)));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.remember_invite("tok");

        assert_eq!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Rejected(ClientError::Invite(InviteError::Expired)))
        );
        assert_eq!(ctx.settle_pending_invite().await, None);
    }

    #[tokio::test]
    async fn pending_invite_kept_on_network_failure() {
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        {
            let mut accept = api.accept.lock().expect("lock");
            accept.push(Err(ClientError::Network {
                details: "offline".to_string(),
            }));
            accept.push(Err(ClientError::Invite(InviteError::AlreadyUsed)));
        }
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.remember_invite("tok");

        assert!(matches!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Deferred(_))
        ));
        assert!(matches!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Rejected(_))
        ));
        assert_eq!(ctx.settle_pending_invite().await, None);
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn pending_invite_kept_on_server_error() {
        let op = operator("op@x.com");
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        {
            let mut accept = api.accept.lock().expect("lock");
            accept.push(crate::http::accept_response(500, r#"{"error":"Erro interno"}"#));
            accept.push(Ok(op.clone()));
        }
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.remember_invite("tok");

        assert_eq!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Deferred(ClientError::ServiceUnavailable))
        );
        assert_eq!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::Accepted(op))
        );
        assert_eq!(ctx.settle_pending_invite().await, None);
    }

    #[tokio::test]
    async fn validation_mismatch_moves_to_invite_page() {
        let api = FakeApi::new(Some("op@x.com"), AuthorizationOutcome::Denied(DenialReason::NotRegistered));
        api.accept
            .lock()
            .expect("lock")
            .push(Err(ClientError::Invite(InviteError::ValidationMismatch {
                corporate_email_hint: Some("***@empresa.com.br".to_string()),
            })));
        let ctx = AuthContext::new(api, MemoryPendingInvite::new());
        ctx.remember_invite("tok");

        assert_eq!(
            ctx.settle_pending_invite().await,
            Some(InviteSettlement::NeedsValidation {
                token: "tok".to_string(),
                corporate_email_hint: Some("***@empresa.com.br".to_string()),
            })
        );
        assert_eq!(ctx.settle_pending_invite().await, None);
    }
}
