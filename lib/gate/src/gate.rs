//! Route gate state machine.
//!
//! The gate composes two asynchronous steps: resolving the session identity,
//! then resolving that identity to an application user. The second step can
//! only start once the first has produced an identity, and every result is
//! tagged with the session version it was started for. A result for an older
//! version is dropped, so a slow lookup can never apply to a later identity.
//!
//! [`GateMachine::state`] is fail-closed: content is rendered only for a
//! resolved, authorized application user.

use collectdesk_access::{ApplicationUser, Identity, PermissionCheck};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{AccessStatus, AuthorizationOutcome, DenialReason};
use crate::error::ClientError;

/// Progress of one asynchronous step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase<T> {
    NotStarted,
    Pending,
    Resolved(T),
    /// The step failed without a definitive answer.
    Unavailable,
}

/// What the loading view is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadingStage {
    Session,
    Authorization,
    /// The backend could not be reached; retrying is safe.
    Unreachable,
}

/// What a protected region renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "value")]
pub enum GateState {
    Loading(LoadingStage),
    RedirectToLogin,
    /// Terminal "Acesso Negado" view.
    Denied(DenialReason),
    Content(ApplicationUser),
}

impl GateState {
    /// Maps the server-rendered status. A transport failure while fetching
    /// it is a transient, never a decision.
    #[must_use]
    pub fn from_status<E>(status: Result<AccessStatus, E>) -> Self {
        match status {
            Ok(AccessStatus::Anonymous) => Self::RedirectToLogin,
            Ok(AccessStatus::Authorized(user)) => Self::Content(user),
            Ok(AccessStatus::Denied(reason)) => Self::Denied(reason),
            Ok(AccessStatus::Undetermined) | Err(_) => Self::Loading(LoadingStage::Unreachable),
        }
    }

    /// The application user, only when content may be shown.
    #[must_use]
    pub fn user(&self) -> Option<&ApplicationUser> {
        match self {
            Self::Content(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

/// Proof that a session resolution was started, valid until the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    version: u64,
}

/// Proof that an authorization lookup was started for a session version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationTicket {
    version: u64,
}

/// The gate's state machine.
#[derive(Debug, Clone)]
pub struct GateMachine {
    version: u64,
    session: Phase<Option<Identity>>,
    authorization: Phase<AuthorizationOutcome>,
}

impl Default for GateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl GateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: 0,
            session: Phase::NotStarted,
            authorization: Phase::NotStarted,
        }
    }

    /// Starts (or restarts) session resolution. Any in-flight result from an
    /// earlier ticket becomes stale.
    pub fn begin_session(&mut self) -> SessionTicket {
        self.version += 1;
        self.session = Phase::Pending;
        self.authorization = Phase::NotStarted;
        SessionTicket {
            version: self.version,
        }
    }

    /// Applies the session result. Returns false if the ticket is stale.
    pub fn resolve_session(
        &mut self,
        ticket: SessionTicket,
        result: Result<Option<Identity>, ClientError>,
    ) -> bool {
        if ticket.version != self.version {
            debug!(ticket = ticket.version, current = self.version, "dropping stale session result");
            return false;
        }
        self.session = match result {
            Ok(identity) => Phase::Resolved(identity),
            Err(err) => {
                debug!(error = %err, "session could not be resolved");
                Phase::Unavailable
            }
        };
        true
    }

    /// Starts the authorization lookup.
    ///
    /// Returns `None` unless the ticket is current and the session resolved
    /// to an identity: the lookup is causally dependent on the session.
    pub fn begin_authorization(&mut self, ticket: &SessionTicket) -> Option<AuthorizationTicket> {
        if ticket.version != self.version {
            return None;
        }
        if !matches!(self.session, Phase::Resolved(Some(_))) {
            return None;
        }
        self.authorization = Phase::Pending;
        Some(AuthorizationTicket {
            version: self.version,
        })
    }

    /// Applies the authorization result. Returns false if the ticket is
    /// stale.
    pub fn resolve_authorization(
        &mut self,
        ticket: AuthorizationTicket,
        result: Result<AuthorizationOutcome, ClientError>,
    ) -> bool {
        if ticket.version != self.version || self.authorization != Phase::Pending {
            debug!(ticket = ticket.version, current = self.version, "dropping stale authorization result");
            return false;
        }
        self.authorization = match result {
            Ok(outcome) => Phase::Resolved(outcome),
            Err(err) => {
                debug!(error = %err, "authorization could not be resolved");
                Phase::Unavailable
            }
        };
        true
    }

    /// Forgets the session after logout. In-flight results become stale.
    pub fn sign_out(&mut self) {
        self.version += 1;
        self.session = Phase::Resolved(None);
        self.authorization = Phase::NotStarted;
    }

    #[must_use]
    pub fn session_phase(&self) -> &Phase<Option<Identity>> {
        &self.session
    }

    #[must_use]
    pub fn authorization_phase(&self) -> &Phase<AuthorizationOutcome> {
        &self.authorization
    }

    /// The resolved identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match &self.session {
            Phase::Resolved(Some(identity)) => Some(identity),
            _ => None,
        }
    }

    /// The authorized application user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&ApplicationUser> {
        match (&self.session, &self.authorization) {
            (
                Phase::Resolved(Some(_)),
                Phase::Resolved(AuthorizationOutcome::Authorized(user)),
            ) => Some(user),
            _ => None,
        }
    }

    /// Capability check against the authorized user; false otherwise.
    #[must_use]
    pub fn has_permission(&self, code: &str) -> bool {
        self.user().is_some_and(|u| u.has_permission(code))
    }

    /// What the protected region renders now.
    #[must_use]
    pub fn state(&self) -> GateState {
        match &self.session {
            Phase::NotStarted | Phase::Pending => GateState::Loading(LoadingStage::Session),
            Phase::Unavailable => GateState::Loading(LoadingStage::Unreachable),
            Phase::Resolved(None) => GateState::RedirectToLogin,
            Phase::Resolved(Some(_)) => match &self.authorization {
                Phase::NotStarted | Phase::Pending => {
                    GateState::Loading(LoadingStage::Authorization)
                }
                Phase::Unavailable => GateState::Loading(LoadingStage::Unreachable),
                Phase::Resolved(AuthorizationOutcome::Denied(reason)) => GateState::Denied(*reason),
                Phase::Resolved(AuthorizationOutcome::Authorized(user)) => {
                    GateState::Content(user.clone())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collectdesk_access::{BlockReason, system_roles};

    fn identity(email: &str) -> Identity {
        Identity::new(format!("sub-{email}"), email.to_string())
    }

    fn user(email: &str) -> ApplicationUser {
        let roles = system_roles();
        let operator = roles
            .iter()
            .find(|r| r.name == "Operador")
            .expect("operator");
        ApplicationUser::new(email, "Op".to_string(), operator, Utc::now())
    }

    #[test]
    fn starts_loading() {
        let gate = GateMachine::new();
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Session));
    }

    #[test]
    fn pending_session_is_loading_not_denied() {
        let mut gate = GateMachine::new();
        let _ticket = gate.begin_session();
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Session));
        assert!(gate.user().is_none());
        assert!(!gate.has_permission("cases.view"));
    }

    #[test]
    fn no_identity_redirects_to_login() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        assert!(gate.resolve_session(ticket, Ok(None)));
        assert_eq!(gate.state(), GateState::RedirectToLogin);
        assert!(gate.begin_authorization(&ticket).is_none());
    }

    #[test]
    fn authorization_cannot_start_before_session() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        assert!(gate.begin_authorization(&ticket).is_none());
        assert_eq!(gate.authorization_phase(), &Phase::NotStarted);
    }

    #[test]
    fn unregistered_identity_is_denied() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        gate.resolve_session(ticket, Ok(Some(identity("a@x.com"))));
        let auth = gate.begin_authorization(&ticket).expect("session resolved");
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Authorization));

        gate.resolve_authorization(
            auth,
            Ok(AuthorizationOutcome::Denied(DenialReason::NotRegistered)),
        );
        assert_eq!(gate.state(), GateState::Denied(DenialReason::NotRegistered));
        assert!(gate.user().is_none());
    }

    #[test]
    fn authorized_user_sees_content() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        gate.resolve_session(ticket, Ok(Some(identity("op@x.com"))));
        let auth = gate.begin_authorization(&ticket).expect("session resolved");
        let op = user("op@x.com");
        gate.resolve_authorization(auth, Ok(AuthorizationOutcome::Authorized(op.clone())));
        assert_eq!(gate.state(), GateState::Content(op));
        assert!(gate.has_permission("cases.edit"));
        assert!(!gate.has_permission("users.manage"));
    }

    #[test]
    fn network_failure_is_never_a_decision() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        gate.resolve_session(
            ticket,
            Err(ClientError::Network {
                details: "offline".to_string(),
            }),
        );
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Unreachable));

        let ticket = gate.begin_session();
        gate.resolve_session(ticket, Ok(Some(identity("op@x.com"))));
        let auth = gate.begin_authorization(&ticket).expect("resolved");
        gate.resolve_authorization(auth, Err(ClientError::ServiceUnavailable));
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Unreachable));
    }

    #[test]
    fn stale_authorization_result_is_dropped() {
        let mut gate = GateMachine::new();
        let first = gate.begin_session();
        gate.resolve_session(first, Ok(Some(identity("admin@x.com"))));
        let stale = gate.begin_authorization(&first).expect("resolved");

        // identity changes while the first lookup is in flight
        let second = gate.begin_session();
        gate.resolve_session(second, Ok(Some(identity("other@x.com"))));
        let current = gate.begin_authorization(&second).expect("resolved");

        assert!(!gate.resolve_authorization(
            stale,
            Ok(AuthorizationOutcome::Authorized(user("admin@x.com")))
        ));
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Authorization));

        assert!(gate.resolve_authorization(
            current,
            Ok(AuthorizationOutcome::Denied(DenialReason::Blocked(
                BlockReason::Inactive
            )))
        ));
        assert_eq!(
            gate.state(),
            GateState::Denied(DenialReason::Blocked(BlockReason::Inactive))
        );
    }

    #[test]
    fn stale_session_result_is_dropped() {
        let mut gate = GateMachine::new();
        let first = gate.begin_session();
        let second = gate.begin_session();
        assert!(!gate.resolve_session(first, Ok(Some(identity("a@x.com")))));
        assert_eq!(gate.state(), GateState::Loading(LoadingStage::Session));
        assert!(gate.begin_authorization(&first).is_none());
        assert!(gate.resolve_session(second, Ok(None)));
    }

    #[test]
    fn sign_out_discards_in_flight_lookup() {
        let mut gate = GateMachine::new();
        let ticket = gate.begin_session();
        gate.resolve_session(ticket, Ok(Some(identity("op@x.com"))));
        let auth = gate.begin_authorization(&ticket).expect("resolved");
        gate.sign_out();
        assert!(!gate.resolve_authorization(
            auth,
            Ok(AuthorizationOutcome::Authorized(user("op@x.com")))
        ));
        assert_eq!(gate.state(), GateState::RedirectToLogin);
    }

    #[test]
    fn status_mapping_is_fail_closed() {
        assert_eq!(
            GateState::from_status::<()>(Ok(AccessStatus::Anonymous)),
            GateState::RedirectToLogin
        );
        assert_eq!(
            GateState::from_status::<()>(Ok(AccessStatus::Undetermined)),
            GateState::Loading(LoadingStage::Unreachable)
        );
        assert_eq!(
            GateState::from_status::<&str>(Err("connection reset")),
            GateState::Loading(LoadingStage::Unreachable)
        );
        assert_eq!(
            GateState::from_status::<()>(Ok(AccessStatus::Denied(DenialReason::NotRegistered))),
            GateState::Denied(DenialReason::NotRegistered)
        );
    }
}
