//! Signed session tokens carried in the `orchard_session` cookie.
//!
//! Format: `v1.<base64url(JSON claims)>.<base64url(HMAC-SHA256)>`, where the
//! MAC covers `v1.<payload>`. Tokens are stateless; a token is valid while its
//! signature checks out and `exp` is in the future.

use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tower_sessions::cookie::{Cookie, SameSite};

use orchard_core::{CustomerId, Email};

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "orchard_session";

/// Absolute session lifetime in days.
pub const SESSION_LIFETIME_DAYS: i64 = 7;

const TOKEN_VERSION: &str = "v1";

/// Errors that can occur when issuing or verifying a session token.
#[derive(Debug, Error)]
pub enum SessionTokenError {
    /// The token is not three dot-separated base64url segments.
    #[error("malformed session token")]
    Malformed,
    /// The token was issued by an incompatible format version.
    #[error("unsupported session token version")]
    UnsupportedVersion,
    /// The signature does not match.
    #[error("invalid session token signature")]
    InvalidSignature,
    /// The token is past its `exp`.
    #[error("session token expired")]
    Expired,
    /// Claims could not be serialized.
    #[error("session claims encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The signing key was rejected by the MAC.
    #[error("invalid signing key")]
    Key,
}

/// Identity carried by a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Verified, normalized email address.
    pub email: Email,
    /// Upstream customer identity, present after a Customer Account login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// Issues and verifies session tokens and builds the matching cookies.
#[derive(Clone)]
pub struct SessionTokens {
    secret: SecretString,
    secure_cookies: bool,
}

impl SessionTokens {
    /// Create an issuer signing with `secret`.
    #[must_use]
    pub fn new(secret: SecretString, secure_cookies: bool) -> Self {
        Self {
            secret,
            secure_cookies,
        }
    }

    /// Issue a token valid for seven days from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn issue(
        &self,
        email: &Email,
        customer_id: Option<&CustomerId>,
    ) -> Result<String, SessionTokenError> {
        self.issue_at(email, customer_id, Utc::now())
    }

    /// Issue a token as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn issue_at(
        &self,
        email: &Email,
        customer_id: Option<&CustomerId>,
        now: DateTime<Utc>,
    ) -> Result<String, SessionTokenError> {
        let claims = SessionClaims {
            email: email.clone(),
            customer_id: customer_id.cloned(),
            iat: now.timestamp(),
            exp: (now + TimeDelta::days(SESSION_LIFETIME_DAYS)).timestamp(),
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{TOKEN_VERSION}.{payload}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns the reason the token is not acceptable.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionTokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the reason the token is not acceptable.
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, SessionTokenError> {
        let mut parts = token.split('.');
        let (Some(version), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionTokenError::Malformed);
        };

        if version != TOKEN_VERSION {
            return Err(SessionTokenError::UnsupportedVersion);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionTokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(version.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionTokenError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionTokenError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| SessionTokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(SessionTokenError::Expired);
        }

        Ok(claims)
    }

    /// Read and verify the session cookie from request headers.
    ///
    /// Absent or invalid cookies yield `None`: the request is anonymous.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| Cookie::parse(pair.trim()).ok())
            .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)?;

        match self.verify(token.value()) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid session cookie");
                None
            }
        }
    }

    /// Cookie carrying `token`: `HttpOnly`, `SameSite=Lax`, seven-day max-age,
    /// `Secure` when serving over HTTPS.
    #[must_use]
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, token))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(tower_sessions::cookie::time::Duration::days(
                SESSION_LIFETIME_DAYS,
            ))
            .path("/")
            .build()
    }

    /// Cookie that deletes the session cookie.
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, ""))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(tower_sessions::cookie::time::Duration::ZERO)
            .path("/")
            .build()
    }

    fn mac(&self) -> Result<HmacSha256, SessionTokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SessionTokenError::Key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn tokens() -> SessionTokens {
        SessionTokens::new(SecretString::from("k".repeat(32)), true)
    }

    fn email() -> Email {
        Email::parse("shopper@example.com").unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let now = Utc::now();
        let customer = CustomerId::new("gid://shopify/Customer/1");
        let token = tokens().issue_at(&email(), Some(&customer), now).unwrap();

        assert!(token.starts_with("v1."));
        let claims = tokens().verify_at(&token, now).unwrap();
        assert_eq!(claims.email, email());
        assert_eq!(claims.customer_id, Some(customer));
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_expiry() {
        let issued = Utc::now();
        let token = tokens().issue_at(&email(), None, issued).unwrap();

        let almost = issued + TimeDelta::days(7) - TimeDelta::seconds(1);
        assert!(tokens().verify_at(&token, almost).is_ok());

        let after = issued + TimeDelta::days(7);
        assert!(matches!(
            tokens().verify_at(&token, after),
            Err(SessionTokenError::Expired)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = tokens().issue(&email(), None).unwrap();
        let other = SessionTokens::new(SecretString::from("z".repeat(32)), true);
        assert!(matches!(
            other.verify(&token),
            Err(SessionTokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = tokens().issue(&email(), None).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = SessionClaims {
            email: Email::parse("attacker@example.com").unwrap(),
            customer_id: None,
            iat: 0,
            exp: i64::MAX,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("v1.{forged_payload}.{}", parts.get(2).unwrap());

        assert!(matches!(
            tokens().verify(&forged),
            Err(SessionTokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        for bad in ["", "v1", "v1.abc", "v1.a.b.c", "v1.!!!.@@@"] {
            assert!(tokens().verify(bad).is_err(), "accepted {bad:?}");
        }
        assert!(matches!(
            tokens().verify("v2.a.b"),
            Err(SessionTokenError::UnsupportedVersion)
        ));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = tokens().session_cookie("abc".to_string()).to_string();
        assert!(cookie.starts_with("orchard_session=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=604800"));

        let insecure = SessionTokens::new(SecretString::from("k".repeat(32)), false);
        assert!(!insecure.session_cookie("abc".to_string()).to_string().contains("Secure"));
    }

    #[test]
    fn test_removal_cookie() {
        let cookie = tokens().removal_cookie().to_string();
        assert!(cookie.starts_with("orchard_session="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_from_headers() {
        let token = tokens().issue(&email(), None).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; orchard_session={token}; x=1")).unwrap(),
        );
        assert_eq!(tokens().read(&headers).unwrap().email, email());
    }

    #[test]
    fn test_read_is_anonymous_for_missing_or_invalid() {
        assert!(tokens().read(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("orchard_session=v1.garbage.sig"),
        );
        assert!(tokens().read(&headers).is_none());
    }
}
