//! One-time verification code type.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a submitted [`VerificationCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeFormatError {
    /// The submitted code is empty.
    #[error("verification code cannot be empty")]
    Empty,
    /// The submitted code is not exactly six ASCII digits.
    #[error("verification code must be {len} digits")]
    InvalidFormat {
        /// Required number of digits.
        len: usize,
    },
}

/// A six-digit numeric one-time code, stored as a zero-padded string.
///
/// Generated codes fall in `100000..=999999`; parsed codes accept any six
/// digits so that a user typing a leading zero gets a mismatch rather than a
/// format error.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Number of digits in a code.
    pub const LENGTH: usize = 6;

    /// Generate a uniformly random code.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    /// Generate a code from the given random source.
    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let value: u32 = rng.random_range(100_000..1_000_000);
        Self(format!("{value:06}"))
    }

    /// Parse a user-submitted code, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty or not six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, CodeFormatError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CodeFormatError::Empty);
        }
        if trimmed.len() != Self::LENGTH || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeFormatError::InvalidFormat { len: Self::LENGTH });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the code digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against another code without short-circuiting on the first
    /// differing digit.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

// Codes are secrets; keep them out of debug output and logs.
impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerificationCode([REDACTED])")
    }
}
