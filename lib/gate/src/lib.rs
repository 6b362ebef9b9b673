//! Client-side authorization gate for the collectdesk dashboard.
//!
//! This crate provides:
//! - The REST contract and its wire types (`AuthApi`, `ErrorBody`, ...)
//! - `GateMachine`, the fail-closed route gate with a stale-result guard
//! - `AuthContext`, the explicitly constructed context the UI receives
//! - `PendingInviteStore` for invites held across the OAuth round-trip
//! - `HttpAuthApi` (feature `http`), a reqwest implementation of `AuthApi`
//!
//! # Example
//!
//! ```
//! use collectdesk_gate::{GateMachine, GateState, LoadingStage};
//!
//! let mut gate = GateMachine::new();
//! let ticket = gate.begin_session();
//! assert_eq!(gate.state(), GateState::Loading(LoadingStage::Session));
//!
//! gate.resolve_session(ticket, Ok(None));
//! assert_eq!(gate.state(), GateState::RedirectToLogin);
//! ```

pub mod api;
pub mod context;
pub mod error;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod pending;

pub use api::{
    AcceptInviteRequest, AccessStatus, AppUserResponse, AuthApi, AuthorizationOutcome,
    CreateSessionRequest, CurrentIdentityResponse, DenialReason, ErrorBody, RedirectUrlResponse,
};
pub use context::{AuthContext, InviteSettlement};
pub use error::ClientError;
pub use gate::{AuthorizationTicket, GateMachine, GateState, LoadingStage, Phase, SessionTicket};
#[cfg(feature = "http")]
pub use http::HttpAuthApi;
pub use pending::{MemoryPendingInvite, PendingInviteStore};
