//! CLI command implementations.

pub mod kv;
pub mod migrate;
pub mod secret;

use secrecy::SecretString;
use sqlx::PgPool;

/// Errors shared by database commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Missing environment variable: ORCHARD_KV_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("KV error: {0}")]
    Kv(#[from] orchard_storefront::kv::KvError),

    #[error("Secret too short: {0} characters, need at least {1}")]
    SecretTooShort(usize, usize),
}

/// Connect using `ORCHARD_KV_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("ORCHARD_KV_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingDatabaseUrl)?;

    tracing::info!("Connecting to database...");
    Ok(orchard_storefront::db::create_pool(&database_url).await?)
}
