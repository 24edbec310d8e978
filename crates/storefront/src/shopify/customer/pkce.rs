//! PKCE (RFC 7636) helpers for the Customer Account OAuth flow.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved characters allowed in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Alphanumerics used for `state` and `nonce`.
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Verifier length; RFC 7636 allows 43 to 128.
const VERIFIER_LENGTH: usize = 64;

/// A code verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh random verifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_string(VERIFIER_CHARSET, VERIFIER_LENGTH))
    }

    /// Derive the challenge for an existing verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    /// The secret verifier, sent only to the token endpoint.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The public `code_challenge`.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Random alphanumeric token for OAuth `state` and `nonce`.
#[must_use]
pub fn random_token(length: usize) -> String {
    random_string(TOKEN_CHARSET, length)
}

fn random_string(charset: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .filter_map(|_| charset.get(rng.random_range(0..charset.len())))
        .map(|&b| char::from(b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_challenge() {
        let pkce = PkceChallenge::from_verifier(
            "orchard-test-verifier-0123456789-abcdefghijklmnopqrstuvwxyz".to_string(),
        );
        assert_eq!(
            pkce.challenge(),
            "oY5QgZc9yX7N48pClwijBQMl82sW6e-WKV25S337K9I"
        );
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.verifier().len(), VERIFIER_LENGTH);
        assert!(pkce.verifier().bytes().all(|b| VERIFIER_CHARSET.contains(&b)));
        assert_eq!(pkce.challenge().len(), 43);
        assert_ne!(PkceChallenge::generate().verifier(), pkce.verifier());
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let pkce = PkceChallenge::generate();
        assert!(!format!("{pkce:?}").contains(pkce.verifier()));
    }

    #[test]
    fn test_random_token() {
        let token = random_token(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
