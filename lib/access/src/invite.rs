//! Single-use invite tokens and corporate email validation.
//!
//! An invite moves `Issued -> Consumed` exactly once. Expired and consumed
//! tokens never grant access; a corporate email mismatch leaves the token
//! untouched so the invitee can retry with a corrected address.

use chrono::{DateTime, Duration, Utc};
use collectdesk_core::{InviteId, RoleId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::InviteError;
use crate::identity::normalize_email;

/// Validity used when the inviter does not choose one.
pub const DEFAULT_INVITE_HOURS: u32 = 72;

/// Longest validity an inviter may choose (30 days).
pub const MAX_INVITE_HOURS: u32 = 720;

/// Lifecycle status of an invite at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Issued,
    Expired,
    Consumed,
}

/// Single-use onboarding credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteToken {
    pub id: InviteId,
    /// The secret carried in the invite link.
    pub token: String,
    /// Name of the invitee, used for the created user.
    pub name: String,
    pub role_id: RoleId,
    /// Address the invite was sent to. Informational.
    pub target_email: Option<String>,
    /// Either `@domain` or a full address.
    pub corporate_email_hint: Option<String>,
    pub invited_by: UserId,
    pub expires_at: DateTime<Utc>,
    pub requires_corporate_validation: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl InviteToken {
    /// Returns the status at `now`. Consumption wins over expiry.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> InviteStatus {
        if self.consumed_at.is_some() {
            InviteStatus::Consumed
        } else if now >= self.expires_at {
            InviteStatus::Expired
        } else {
            InviteStatus::Issued
        }
    }

    /// Fails with the terminal error for a token that can no longer be used.
    ///
    /// # Errors
    ///
    /// `AlreadyUsed` for consumed tokens, `Expired` for expired ones.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), InviteError> {
        match self.status(now) {
            InviteStatus::Issued => Ok(()),
            InviteStatus::Consumed => Err(InviteError::AlreadyUsed),
            InviteStatus::Expired => Err(InviteError::Expired),
        }
    }

    /// Masked form of the corporate hint, safe to show before login.
    #[must_use]
    pub fn masked_hint(&self) -> Option<String> {
        self.corporate_email_hint.as_deref().map(mask_corporate_hint)
    }

    /// Checks the submitted corporate email when the invite requires one.
    ///
    /// # Errors
    ///
    /// `ValidationMismatch` (carrying the masked hint) when the email is
    /// missing or does not satisfy the hint.
    pub fn check_corporate_email(&self, submitted: Option<&str>) -> Result<(), InviteError> {
        if !self.requires_corporate_validation {
            return Ok(());
        }
        let matched = match (self.corporate_email_hint.as_deref(), submitted) {
            (Some(hint), Some(email)) => corporate_email_matches(hint, email),
            _ => false,
        };
        if matched {
            Ok(())
        } else {
            Err(InviteError::ValidationMismatch {
                corporate_email_hint: self.masked_hint(),
            })
        }
    }

    /// Public view of the invite.
    #[must_use]
    pub fn presentation(
        &self,
        role_name: String,
        role_color: String,
        invited_by_name: Option<String>,
    ) -> InvitePresentation {
        InvitePresentation {
            name: self.name.clone(),
            role_name,
            role_color,
            invited_by_name,
            expires_at: self.expires_at,
            requires_corporate_validation: self.requires_corporate_validation,
            corporate_email_hint: if self.requires_corporate_validation {
                self.masked_hint()
            } else {
                None
            },
        }
    }
}

/// Returns true if `email` satisfies the corporate hint.
///
/// A hint starting with `@` matches any address in that domain; any other
/// hint must equal the address. Comparison ignores case and surrounding
/// whitespace.
#[must_use]
pub fn corporate_email_matches(hint: &str, email: &str) -> bool {
    let hint = normalize_email(hint);
    let email = normalize_email(email);
    if hint.is_empty() || email.is_empty() {
        return false;
    }
    if let Some(domain) = hint.strip_prefix('@') {
        match email.rsplit_once('@') {
            Some((local, email_domain)) => !local.is_empty() && email_domain == domain,
            None => false,
        }
    } else {
        email == hint
    }
}

/// Masks the local part of a corporate hint.
///
/// `joao.silva@empresa.com.br` becomes `j*********@empresa.com.br`;
/// a domain-only hint `@empresa.com.br` becomes `***@empresa.com.br`.
#[must_use]
pub fn mask_corporate_hint(hint: &str) -> String {
    let hint = hint.trim();
    match hint.rsplit_once('@') {
        Some(("", domain)) => format!("***@{domain}"),
        Some((local, domain)) => {
            let mut chars = local.chars();
            let first = chars.next().map(String::from).unwrap_or_default();
            let hidden = "*".repeat(chars.count().max(1));
            format!("{first}{hidden}@{domain}")
        }
        None => "***".to_string(),
    }
}

/// Parameters for issuing an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvite {
    pub name: String,
    pub role_id: RoleId,
    #[serde(default)]
    pub target_email: Option<String>,
    #[serde(default)]
    pub corporate_email_hint: Option<String>,
    #[serde(default)]
    pub requires_corporate_validation: bool,
    /// Defaults to [`DEFAULT_INVITE_HOURS`].
    #[serde(default)]
    pub expires_in_hours: Option<u32>,
}

impl NewInvite {
    /// Validates the request and builds the token.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a blank name, an out-of-range validity, or a
    /// missing hint on an invite that requires corporate validation.
    pub fn into_token(
        self,
        token: String,
        invited_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<InviteToken, InviteError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(InviteError::InvalidRequest {
                details: "name must not be empty".to_string(),
            });
        }
        let hours = self.expires_in_hours.unwrap_or(DEFAULT_INVITE_HOURS);
        if hours == 0 || hours > MAX_INVITE_HOURS {
            return Err(InviteError::InvalidRequest {
                details: format!("expiresInHours must be between 1 and {MAX_INVITE_HOURS}"),
            });
        }
        let hint = self
            .corporate_email_hint
            .map(|h| normalize_email(&h))
            .filter(|h| !h.is_empty());
        if self.requires_corporate_validation {
            match hint.as_deref() {
                Some(h) if is_valid_hint(h) => {}
                _ => {
                    return Err(InviteError::InvalidRequest {
                        details: "a corporate email or @domain is required".to_string(),
                    });
                }
            }
        }
        Ok(InviteToken {
            id: InviteId::new(),
            token,
            name,
            role_id: self.role_id,
            target_email: self.target_email.map(|e| normalize_email(&e)),
            corporate_email_hint: hint,
            invited_by,
            expires_at: now + Duration::hours(i64::from(hours)),
            requires_corporate_validation: self.requires_corporate_validation,
            consumed_at: None,
            consumed_by: None,
            created_at: now,
        })
    }
}

fn is_valid_hint(hint: &str) -> bool {
    match hint.rsplit_once('@') {
        Some((_, domain)) => domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// What an invitee sees when opening the invite link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePresentation {
    pub name: String,
    pub role_name: String,
    pub role_color: String,
    pub invited_by_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub requires_corporate_validation: bool,
    /// Masked; present only when validation is required.
    pub corporate_email_hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(requires: bool, hint: Option<&str>) -> NewInvite {
        NewInvite {
            name: "João Silva".to_string(),
            role_id: RoleId::new(),
            target_email: Some("joao@gmail.com".to_string()),
            corporate_email_hint: hint.map(str::to_string),
            requires_corporate_validation: requires,
            expires_in_hours: None,
        }
    }

    fn token(requires: bool, hint: Option<&str>, now: DateTime<Utc>) -> InviteToken {
        request(requires, hint)
            .into_token("tok".to_string(), UserId::new(), now)
            .expect("valid invite")
    }

    #[test]
    fn mask_full_address() {
        assert_eq!(
            mask_corporate_hint("joao.silva@empresa.com.br"),
            "j*********@empresa.com.br"
        );
        assert_eq!(mask_corporate_hint("a@x.com"), "a*@x.com");
    }

    #[test]
    fn mask_domain_hint() {
        assert_eq!(mask_corporate_hint("@empresa.com.br"), "***@empresa.com.br");
    }

    #[test]
    fn domain_hint_matches_any_address_in_domain() {
        assert!(corporate_email_matches("@empresa.com.br", "Maria@Empresa.com.br"));
        assert!(!corporate_email_matches("@empresa.com.br", "maria@empresa.com"));
        assert!(!corporate_email_matches("@empresa.com.br", "maria@sub.empresa.com.br"));
        assert!(!corporate_email_matches("@empresa.com.br", "@empresa.com.br"));
    }

    #[test]
    fn address_hint_requires_exact_match() {
        assert!(corporate_email_matches("joao@empresa.com.br", " JOAO@empresa.com.br "));
        assert!(!corporate_email_matches("joao@empresa.com.br", "joana@empresa.com.br"));
        assert!(!corporate_email_matches("joao@empresa.com.br", ""));
    }

    #[test]
    fn status_precedence() {
        let now = Utc::now();
        let mut invite = token(false, None, now);
        assert_eq!(invite.status(now), InviteStatus::Issued);
        assert_eq!(
            invite.status(now + Duration::hours(72)),
            InviteStatus::Expired
        );

        invite.consumed_at = Some(now);
        assert_eq!(
            invite.status(now + Duration::hours(100)),
            InviteStatus::Consumed
        );
        assert_eq!(
            invite.ensure_usable(now + Duration::hours(100)),
            Err(InviteError::AlreadyUsed)
        );
    }

    #[test]
    fn expired_token_fails_regardless_of_email() {
        let now = Utc::now();
        let invite = token(true, Some("@empresa.com.br"), now);
        let later = now + Duration::hours(73);
        assert_eq!(invite.ensure_usable(later), Err(InviteError::Expired));
    }

    #[test]
    fn corporate_check_skipped_when_not_required() {
        let invite = token(false, None, Utc::now());
        assert_eq!(invite.check_corporate_email(None), Ok(()));
    }

    #[test]
    fn corporate_check_reports_masked_hint() {
        let invite = token(true, Some("joao.silva@empresa.com.br"), Utc::now());
        assert_eq!(
            invite.check_corporate_email(Some("joao@gmail.com")),
            Err(InviteError::ValidationMismatch {
                corporate_email_hint: Some("j*********@empresa.com.br".to_string())
            })
        );
        assert!(invite.check_corporate_email(None).is_err());
        assert_eq!(
            invite.check_corporate_email(Some("Joao.Silva@empresa.com.br")),
            Ok(())
        );
    }

    #[test]
    fn validation_requires_hint() {
        let err = request(true, None)
            .into_token("tok".to_string(), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, InviteError::InvalidRequest { .. }));

        let err = request(true, Some("empresa"))
            .into_token("tok".to_string(), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, InviteError::InvalidRequest { .. }));
    }

    #[test]
    fn validity_bounds() {
        let now = Utc::now();
        let mut req = request(false, None);
        req.expires_in_hours = Some(MAX_INVITE_HOURS + 1);
        assert!(
            req.clone()
                .into_token("t".to_string(), UserId::new(), now)
                .is_err()
        );

        req.expires_in_hours = Some(0);
        assert!(
            req.clone()
                .into_token("t".to_string(), UserId::new(), now)
                .is_err()
        );

        req.expires_in_hours = Some(24);
        let invite = req
            .into_token("t".to_string(), UserId::new(), now)
            .expect("valid");
        assert_eq!(invite.expires_at, now + Duration::hours(24));
    }

    #[test]
    fn presentation_hides_hint_when_not_required() {
        let invite = token(false, Some("@empresa.com.br"), Utc::now());
        let view = invite.presentation("Operador".to_string(), "#16a34a".to_string(), None);
        assert!(view.corporate_email_hint.is_none());

        let invite = token(true, Some("@empresa.com.br"), Utc::now());
        let view = invite.presentation(
            "Operador".to_string(),
            "#16a34a".to_string(),
            Some("Carla".to_string()),
        );
        assert_eq!(
            view.corporate_email_hint.as_deref(),
            Some("***@empresa.com.br")
        );
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["requiresCorporateValidation"], true);
        assert_eq!(json["invitedByName"], "Carla");
    }
}
