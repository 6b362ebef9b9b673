//! Errors seen by clients of the REST surface.

use collectdesk_access::InviteError;
use std::fmt;

/// Failure of a call against the backend.
///
/// `Network` and `ServiceUnavailable` are transient: they say nothing about
/// whether the caller is authorized and must never be read as a denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request did not complete.
    Network { details: String },
    /// The backend could not determine the outcome (HTTP 5xx or 429).
    ServiceUnavailable,
    /// The OAuth code exchange was rejected.
    InvalidCode,
    /// The call needs a session and there is none.
    Unauthenticated,
    /// The invite call failed with a definite outcome.
    Invite(InviteError),
    /// Any response the client does not understand.
    Unexpected { status: u16, details: String },
}

impl ClientError {
    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::ServiceUnavailable)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { details } => write!(f, "network error: {details}"),
            Self::ServiceUnavailable => write!(f, "service unavailable"),
            Self::InvalidCode => write!(f, "login failed, try again"),
            Self::Unauthenticated => write!(f, "not signed in"),
            Self::Invite(err) => write!(f, "{err}"),
            Self::Unexpected { status, details } => {
                write!(f, "unexpected response ({status}): {details}")
            }
        }
    }
}

impl std::error::Error for ClientError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            ClientError::Network {
                details: "timeout".to_string()
            }
            .is_transient()
        );
        assert!(ClientError::ServiceUnavailable.is_transient());
        assert!(!ClientError::InvalidCode.is_transient());
        assert!(!ClientError::Invite(InviteError::Expired).is_transient());
    }
}
