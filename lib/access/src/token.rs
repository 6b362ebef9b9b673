//! Opaque secret generation for session ids and invite tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Bytes of entropy in every generated secret.
pub const SECRET_BYTES: usize = 32;

/// Generates a URL-safe secret from the operating system RNG.
///
/// # Errors
///
/// Returns an error if the OS random source is unavailable.
pub fn generate_secret() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; SECRET_BYTES];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_url_safe_and_unpadded() {
        let secret = generate_secret().expect("rng");
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(secret.len(), 43);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn secrets_differ() {
        let a = generate_secret().expect("rng");
        let b = generate_secret().expect("rng");
        assert_ne!(a, b);
    }
}
