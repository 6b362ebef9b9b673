//! Typed identifiers for users, roles and invites.
//!
//! Each id wraps a ULID and prints with a short kind prefix (`usr_…`,
//! `role_…`, `inv_…`) so ids stay recognisable in logs and URLs. Parsing
//! accepts the prefixed form and the bare ULID; serde uses the bare ULID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// A string that is not a valid id of the expected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// Type name of the id, e.g. `"UserId"`.
    pub id_type: &'static str,
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Fresh id ordered after every id minted earlier.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                raw.parse::<Ulid>().map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }
    };
}

ulid_id!(
    /// An application user.
    UserId => "usr"
);

ulid_id!(
    /// A role, custom or system.
    RoleId => "role"
);

ulid_id!(
    /// Storage key of an invite. Never the secret token itself.
    InviteId => "inv"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_prefix() {
        assert!(UserId::new().to_string().starts_with("usr_"));
        assert!(RoleId::new().to_string().starts_with("role_"));
        assert!(InviteId::new().to_string().starts_with("inv_"));
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = RoleId::new();
        assert_eq!(id.to_string().parse::<RoleId>(), Ok(id));

        let ulid = Ulid::new();
        assert_eq!(ulid.to_string().parse::<UserId>(), Ok(UserId::from(ulid)));
    }

    #[test]
    fn rejects_garbage() {
        let err = "usr_not_a_ulid".parse::<UserId>().unwrap_err();
        assert_eq!(err.id_type, "UserId");
        assert!(err.to_string().starts_with("invalid UserId"));
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = InviteId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
