//! Server-side sessions.
//!
//! A session is created when an authorization code is exchanged for an
//! identity. It carries only the identity: authorization is resolved fresh
//! on every lookup so deactivations take effect immediately.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::token::generate_secret;

/// Opaque session identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh random session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source is unavailable.
    pub fn generate() -> Result<Self, getrandom::Error> {
        generate_secret().map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session starting at `now` that lives for `duration`.
    #[must_use]
    pub fn new(id: SessionId, identity: Identity, now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            id,
            identity,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        identity: Identity,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            identity,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the identity the session was established for.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("1098".to_string(), "ana@empresa.com.br".to_string())
    }

    #[test]
    fn session_id_display() {
        let id = SessionId::new("sess_test_123".to_string());
        assert_eq!(id.to_string(), "sess_test_123");
        assert_eq!(SessionId::from("sess_test_123"), id);
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = SessionId::generate().expect("rng");
        let b = SessionId::generate().expect("rng");
        assert_ne!(a, b);
    }

    #[test]
    fn new_session_has_correct_fields() {
        let now = Utc::now();
        let session = Session::new(
            SessionId::from("s1"),
            identity(),
            now,
            Duration::minutes(480),
        );
        assert_eq!(session.identity().email(), "ana@empresa.com.br");
        assert_eq!(session.created_at(), now);
        assert_eq!(session.expires_at(), now + Duration::minutes(480));
    }

    #[test]
    fn session_expiration_boundary() {
        let now = Utc::now();
        let session = Session::new(SessionId::from("s1"), identity(), now, Duration::hours(1));
        assert!(!session.is_expired_at(now));
        assert!(!session.is_expired_at(now + Duration::minutes(59)));
        assert!(session.is_expired_at(now + Duration::hours(1)));
    }
}
