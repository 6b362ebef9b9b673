//! Storage for an invite token held across the OAuth round-trip.

use std::sync::{Mutex, PoisonError};

/// Holds at most one pending invite token.
///
/// Written when an invite link is opened; cleared exactly once when the
/// invite is accepted or definitively rejected.
pub trait PendingInviteStore {
    fn save(&self, token: &str);

    fn peek(&self) -> Option<String>;

    fn clear(&self);
}

/// Process-local pending invite.
#[derive(Debug, Default)]
pub struct MemoryPendingInvite {
    token: Mutex<Option<String>>,
}

impl MemoryPendingInvite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingInviteStore for MemoryPendingInvite {
    fn save(&self, token: &str) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn peek(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_peek_clear() {
        let store = MemoryPendingInvite::new();
        assert_eq!(store.peek(), None);
        store.save("abc");
        assert_eq!(store.peek().as_deref(), Some("abc"));
        assert_eq!(store.peek().as_deref(), Some("abc"));
        store.save("def");
        assert_eq!(store.peek().as_deref(), Some("def"));
        store.clear();
        assert_eq!(store.peek(), None);
    }
}
