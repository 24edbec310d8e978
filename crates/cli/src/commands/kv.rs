//! KV maintenance commands.
//!
//! Expired rows are already invisible to readers; purging only reclaims
//! space. Safe to run from cron.

use orchard_storefront::kv::PostgresKvStore;

use super::{CommandError, connect};

/// Delete every expired KV row.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn purge_expired() -> Result<(), CommandError> {
    let store = PostgresKvStore::new(connect().await?);
    let removed = store.purge_expired().await?;
    tracing::info!(removed, "Expired KV entries purged");
    Ok(())
}
