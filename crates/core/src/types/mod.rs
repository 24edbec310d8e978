//! Core types for Orchard.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod code;
pub mod email;
pub mod id;
pub mod price;

pub use code::{CodeFormatError, VerificationCode};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Money;
