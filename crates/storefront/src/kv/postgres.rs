//! `PostgreSQL`-backed KV store.
//!
//! Schema (see `migrations/`):
//!
//! ```sql
//! CREATE TABLE storefront.kv_entry (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use std::time::Duration;

use sqlx::PgPool;
use tracing::instrument;

use super::{KvError, KvStore};

/// KV store over the `storefront.kv_entry` table.
///
/// Reads filter on `expires_at > now()`, so expiry is exact even though rows
/// are only physically removed by [`PostgresKvStore::purge_expired`].
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Delete every expired row. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, KvError> {
        let result = sqlx::query("DELETE FROM storefront.kv_entry WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl KvStore for PostgresKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM storefront.kv_entry WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        sqlx::query(
            r"
            INSERT INTO storefront.kv_entry (key, value, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM storefront.kv_entry WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        // One statement: the row lock taken by ON CONFLICT serializes
        // concurrent increments on the same key.
        let count: i64 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.kv_entry AS e (key, value, expires_at)
            VALUES ($1, '1', now() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE
            SET value = CASE
                    WHEN e.expires_at > now() THEN (e.value::bigint + 1)::text
                    ELSE '1'
                END,
                expires_at = CASE
                    WHEN e.expires_at > now() THEN e.expires_at
                    ELSE EXCLUDED.expires_at
                END
            RETURNING value::bigint
            ",
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
