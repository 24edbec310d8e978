//! Authentication error types.

use thiserror::Error;

use orchard_core::{CodeFormatError, EmailError};

use super::token::SessionTokenError;
use crate::kv::KvError;
use crate::shopify::ShopifyError;

/// Outcomes of the verification code engine other than success.
#[derive(Debug, Error)]
pub enum CodeError {
    /// No code issued, already consumed, or expired and swept.
    #[error("no verification code found")]
    CodeNotFound,

    /// A code exists but its lifetime has passed; the record was deleted.
    #[error("verification code expired")]
    CodeExpired,

    /// A live code exists but differs from the submission; it is kept.
    #[error("verification code mismatch")]
    CodeMismatch,

    /// The per-email attempt cap for the current window was exceeded.
    #[error("too many attempts")]
    TooManyAttempts,

    /// The KV store failed; distinct from `CodeNotFound`.
    #[error("verification storage unavailable: {0}")]
    StorageUnavailable(#[from] KvError),
}

impl CodeError {
    /// Message safe to show the shopper.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::CodeNotFound => {
                "No verification code found. Please request a new code."
            }
            Self::CodeExpired => "Verification code has expired. Please request a new code.",
            Self::CodeMismatch => "Invalid code. Please check the code and try again.",
            Self::TooManyAttempts => "Too many attempts, please try again later.",
            Self::StorageUnavailable(_) => {
                "We couldn't reach the verification service. Please try again."
            }
        }
    }
}

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Submitted code is missing or not six digits.
    #[error("invalid code: {0}")]
    InvalidCode(#[from] CodeFormatError),

    /// Verification code engine outcome.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Session token could not be issued.
    #[error("session token error: {0}")]
    Token(#[from] SessionTokenError),

    /// OAuth state missing, unknown, or already used.
    #[error("invalid oauth state")]
    InvalidOAuthState,

    /// The shopper or Shopify declined the OAuth request.
    #[error("oauth denied: {0}")]
    OAuthDenied(String),

    /// PKCE verifier storage failed.
    #[error("kv error: {0}")]
    Storage(#[from] KvError),

    /// Customer Account API call failed.
    #[error("customer account error: {0}")]
    Shopify(#[from] ShopifyError),
}
