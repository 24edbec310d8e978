//! Key-value store for short-lived secrets.
//!
//! Holds verification codes, OAuth PKCE verifiers, and rate-limit counters.
//! Every entry carries a TTL; expired entries are invisible to readers even
//! before they are physically removed.
//!
//! # Key namespaces
//!
//! | Prefix | Value |
//! |---|---|
//! | `verify:<email>` | JSON verification code record |
//! | `pkce:<state>` | JSON PKCE verifier record |
//! | `attempts:<kind>:<email>` | decimal counter |
//!
//! # Backends
//!
//! - [`MemoryKvStore`] for development and tests
//! - [`PostgresKvStore`] for production (`storefront.kv_entry` table)

mod memory;
mod postgres;

pub use memory::MemoryKvStore;
pub use postgres::PostgresKvStore;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Key prefix for verification code records.
pub const VERIFY_PREFIX: &str = "verify:";
/// Key prefix for OAuth PKCE verifier records.
pub const PKCE_PREFIX: &str = "pkce:";
/// Key prefix for attempt counters.
pub const ATTEMPTS_PREFIX: &str = "attempts:";

/// Errors raised by a KV backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backing database failed or was unreachable.
    #[error("kv database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A value could not be encoded for storage.
    #[error("kv value encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored counter did not hold an integer.
    #[error("kv value at {key} is not a counter")]
    NotACounter {
        /// Offending key.
        key: String,
    },
}

/// A TTL-aware key-value store.
///
/// `increment` must be atomic with respect to concurrent callers on the same
/// key; callers rely on it instead of a read-then-write pair.
pub trait KvStore: Send + Sync {
    /// Read a live value.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send;

    /// Write a value, replacing any previous one, expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Remove a value. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Atomically add one to a counter and return the new value.
    ///
    /// A missing or expired counter starts at 1 and expires after `ttl`;
    /// later increments keep the original expiry.
    fn increment(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<i64, KvError>> + Send;
}

/// The KV backend selected at startup.
#[derive(Clone)]
pub enum KvBackend {
    /// Process-local store.
    Memory(MemoryKvStore),
    /// Shared `PostgreSQL` store.
    Postgres(PostgresKvStore),
}

impl KvBackend {
    /// Backend name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

impl KvStore for KvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Postgres(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        match self {
            Self::Memory(store) => store.set(key, value, ttl).await,
            Self::Postgres(store) => store.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::Postgres(store) => store.delete(key).await,
        }
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        match self {
            Self::Memory(store) => store.increment(key, ttl).await,
            Self::Postgres(store) => store.increment(key, ttl).await,
        }
    }
}
