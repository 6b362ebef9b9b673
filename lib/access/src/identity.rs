//! Identities authenticated by the external OAuth provider.
//!
//! An `Identity` says who the caller is according to the provider. It grants
//! nothing by itself: authorization comes from the application user record
//! resolved by [`AccessService`](crate::service::AccessService).

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::error::AuthenticationError;

/// Principal authenticated by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// The provider's stable subject identifier.
    provider_user_id: String,
    /// Email address reported by the provider.
    email: String,
    /// Whether the provider verified the email address.
    #[serde(default)]
    email_verified: bool,
    /// Display name, if the provider supplied one.
    display_name: Option<String>,
    /// Avatar URL, if the provider supplied one.
    avatar_url: Option<String>,
}

impl Identity {
    /// Creates an identity with a verified email and no profile data.
    #[must_use]
    pub fn new(provider_user_id: String, email: String) -> Self {
        Self {
            provider_user_id,
            email,
            email_verified: true,
            display_name: None,
            avatar_url: None,
        }
    }

    /// Sets whether the email is verified.
    #[must_use]
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = verified;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Sets the avatar URL.
    #[must_use]
    pub fn with_avatar_url(mut self, url: Option<String>) -> Self {
        self.avatar_url = url;
        self
    }

    /// Returns the provider subject identifier.
    #[must_use]
    pub fn provider_user_id(&self) -> &str {
        &self.provider_user_id
    }

    /// Returns the email exactly as the provider reported it.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the email in the form used for lookups.
    #[must_use]
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }

    /// Returns true if the provider verified the email.
    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    /// Returns the display name, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the avatar URL, if any.
    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

/// Canonical form of an email address for comparisons.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Data for redirecting the browser to the provider.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The URL to send the browser to.
    pub authorization_url: String,
    /// What must be kept until the callback arrives.
    pub pending: PendingLogin,
}

/// Login state kept (in a short-lived cookie) across the provider round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// CSRF state parameter.
    pub csrf_token: String,
    /// PKCE code verifier.
    pub pkce_verifier: String,
    /// Nonce for ID token validation.
    pub nonce: String,
}

/// An external OAuth / OpenID Connect provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name used in routes and logs (e.g. "google").
    fn name(&self) -> &str;

    /// Builds the authorization URL and the state to keep for the callback.
    fn authorization_url(&self) -> LoginInitiation;

    /// Exchanges an authorization code for a verified identity.
    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<Identity, Report<AuthenticationError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_builder() {
        let identity = Identity::new("1098".to_string(), "Ana@Empresa.com.br ".to_string())
            .with_display_name(Some("Ana".to_string()))
            .with_avatar_url(Some("https://lh3.googleusercontent.com/a/x".to_string()))
            .with_email_verified(false);

        assert_eq!(identity.provider_user_id(), "1098");
        assert_eq!(identity.normalized_email(), "ana@empresa.com.br");
        assert_eq!(identity.display_name(), Some("Ana"));
        assert!(!identity.email_verified());
    }

    #[test]
    fn identity_wire_format_is_camel_case() {
        let identity = Identity::new("42".to_string(), "a@x.com".to_string());
        let json = serde_json::to_value(&identity).expect("serialize");
        assert_eq!(json["providerUserId"], "42");
        assert_eq!(json["emailVerified"], true);
    }
}
