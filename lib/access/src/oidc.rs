//! OAuth / OpenID Connect provider configuration.
//!
//! Defaults target Google accounts. Fields with defaults can be omitted when
//! loading from environment variables.

use serde::{Deserialize, Serialize};

/// Google's OpenID Connect issuer.
pub const GOOGLE_ISSUER_URL: &str = "https://accounts.google.com";

/// Configuration for the external OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Provider name used in `/api/oauth/<provider>/redirect_url`.
    #[serde(default = "default_provider")]
    provider: String,
    /// Issuer URL used for discovery.
    #[serde(default = "default_issuer_url")]
    issuer_url: String,
    client_id: String,
    client_secret: String,
    /// Callback URL registered with the provider.
    redirect_uri: String,
    /// Scopes to request, comma-separated.
    #[serde(default = "default_scopes")]
    scopes: String,
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_issuer_url() -> String {
    GOOGLE_ISSUER_URL.to_string()
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

impl OAuthConfig {
    /// Creates a Google configuration.
    #[must_use]
    pub fn google(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            provider: default_provider(),
            issuer_url: default_issuer_url(),
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
        }
    }

    /// Points the configuration at another issuer.
    #[must_use]
    pub fn with_issuer(mut self, provider: String, issuer_url: String) -> Self {
        self.provider = provider;
        self.issuer_url = issuer_url;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes to request, without empty entries.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_defaults() {
        let config = OAuthConfig::google(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://painel.example.com/auth/callback".to_string(),
        );
        assert_eq!(config.provider(), "google");
        assert_eq!(config.issuer_url(), GOOGLE_ISSUER_URL);
        assert_eq!(config.scopes(), vec!["openid", "email", "profile"]);
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "client_id": "my-client",
            "client_secret": "secret",
            "redirect_uri": "https://painel.example.com/auth/callback"
        }"#;
        let config: OAuthConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.provider(), "google");
        assert_eq!(config.issuer_url(), "https://accounts.google.com");
        assert_eq!(config.client_id(), "my-client");
    }

    #[test]
    fn scopes_skip_blank_entries() {
        let json = r#"{
            "client_id": "c",
            "client_secret": "s",
            "redirect_uri": "https://x/cb",
            "scopes": "openid, email,,profile "
        }"#;
        let config: OAuthConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.scopes(), vec!["openid", "email", "profile"]);
    }

    #[test]
    fn custom_issuer() {
        let config = OAuthConfig::google("c".to_string(), "s".to_string(), "r".to_string())
            .with_issuer("keycloak".to_string(), "https://sso.example.com/realms/main".to_string());
        assert_eq!(config.provider(), "keycloak");
        assert_eq!(config.issuer_url(), "https://sso.example.com/realms/main");
    }
}
