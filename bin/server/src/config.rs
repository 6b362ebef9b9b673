//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`OAuthConfig`](collectdesk_access::OAuthConfig) for the identity
//! provider settings.

use collectdesk_access::OAuthConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// OAuth provider configuration.
    pub oauth: OAuthConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Contact details shown on the access denied page.
    #[serde(default)]
    pub contact: ContactConfig,

    /// Owner account created at startup.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    480
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// Out-of-band contact path offered to people without access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactConfig {
    /// WhatsApp number in international format, digits only.
    #[serde(default)]
    pub whatsapp_number: Option<String>,

    #[serde(default)]
    pub support_email: Option<String>,
}

impl ContactConfig {
    /// Builds the `wa.me` link, if a number is configured.
    #[must_use]
    pub fn whatsapp_url(&self) -> Option<String> {
        let digits: String = self
            .whatsapp_number
            .as_deref()?
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            None
        } else {
            Some(format!("https://wa.me/{digits}"))
        }
    }
}

/// Initial owner account.
///
/// The owner is an ordinary stored user record. It goes through the same
/// lookup as everyone else.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub owner_email: Option<String>,

    #[serde(default = "default_owner_name")]
    pub owner_name: String,
}

fn default_owner_name() -> String {
    "Administrador".to_string()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            owner_email: None,
            owner_name: default_owner_name(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duration_minutes, 480);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
    }

    #[test]
    fn whatsapp_url_keeps_digits_only() {
        let contact = ContactConfig {
            whatsapp_number: Some("+55 (11) 99999-0000".to_string()),
            support_email: None,
        };
        assert_eq!(
            contact.whatsapp_url().as_deref(),
            Some("https://wa.me/5511999990000")
        );
        assert_eq!(ContactConfig::default().whatsapp_url(), None);
    }

    #[test]
    fn deserializes_nested_sections() {
        let source = config::Config::builder()
            .set_override("database_url", "postgres://localhost/collectdesk")
            .and_then(|b| b.set_override("oauth.client_id", "id"))
            .and_then(|b| b.set_override("oauth.client_secret", "secret"))
            .and_then(|b| b.set_override("oauth.redirect_uri", "http://localhost:3000/auth/callback"))
            .and_then(|b| b.set_override("contact.whatsapp_number", "5511999990000"))
            .expect("overrides")
            .build()
            .expect("build");
        let config: ServerConfig = source.try_deserialize().expect("deserialize");

        assert_eq!(config.oauth.provider(), "google");
        assert_eq!(config.session.duration_minutes, 480);
        assert_eq!(
            config.contact.whatsapp_number.as_deref(),
            Some("5511999990000")
        );
        assert_eq!(config.bootstrap.owner_email, None);
    }
}
