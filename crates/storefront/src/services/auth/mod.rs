//! Authentication services.
//!
//! Passwordless sign-in: a six-digit code is emailed, validated once, and
//! exchanged for a signed session cookie. Shoppers with a Customer Account
//! can also sign in through Shopify's OAuth flow (see [`oauth`]).

pub mod codes;
mod error;
pub mod oauth;
pub mod token;

pub use codes::{Clock, IssuedCode, SystemClock, VerificationCodes};
pub use error::{AuthError, CodeError};
pub use token::{SESSION_COOKIE_NAME, SessionClaims, SessionTokenError, SessionTokens};

use sha2::{Digest, Sha256};

use orchard_core::Email;

/// Short, stable digest of an email address for log fields.
///
/// Addresses never appear in logs; this is enough to correlate events for
/// one shopper.
#[must_use]
pub fn email_hash(email: &Email) -> String {
    let digest = Sha256::digest(email.as_str().as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(12);
    hex
}
