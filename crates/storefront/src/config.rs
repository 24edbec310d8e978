//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required in production
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session token signing secret (min 32 chars, high entropy)
//! - `ORCHARD_KV_URL` - `PostgreSQL` connection string for the KV store and
//!   browser sessions (falls back to `DATABASE_URL`)
//! - `SHOPIFY_STORE` - Shopify store domain (e.g., your-store.myshopify.com)
//! - `SHOPIFY_STOREFRONT_PUBLIC_TOKEN` - Storefront API public access token
//! - `SHOPIFY_CUSTOMER_CLIENT_ID` - Customer Account API client ID
//! - `SHOPIFY_CUSTOMER_SHOP_ID` - Customer Account API numeric shop ID
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` - Code delivery
//!
//! ## Optional
//! - `ORCHARD_ENV` - `production` or `development` (default: development)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SHOPIFY_API_VERSION` - API version (default: 2026-01)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `UPSTREAM_TIMEOUT_SECS` - Timeout for every upstream call (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//!
//! In development every required variable has a fallback: the `mock.shop`
//! demo store, an in-memory KV store, no SMTP (codes are logged), and a
//! random session secret generated per process.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEV_SESSION_SECRET_LENGTH: usize = 48;

const DEFAULT_API_VERSION: &str = "2026-01";
const DEV_STORE: &str = "mock.shop";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development: fallbacks allowed, offline simulation enabled.
    Development,
    /// Production: every credential must be explicit.
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "" => Ok(Self::Development),
            other => Err(ConfigError::InvalidEnvVar(
                "ORCHARD_ENV".to_string(),
                format!("expected 'production' or 'development', got '{other}'"),
            )),
        }
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Name used for logging and Sentry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Deployment environment
    pub environment: Environment,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session token signing secret
    pub session_secret: SecretString,
    /// `PostgreSQL` URL for the KV store; `None` selects the in-memory store
    pub kv_url: Option<SecretString>,
    /// Shopify API configuration
    pub shopify: ShopifyConfig,
    /// SMTP configuration; `None` logs codes instead of sending them
    pub email: Option<EmailConfig>,
    /// Timeout applied to every upstream HTTP call
    pub upstream_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Shopify API configuration.
///
/// Every value here is a public identifier; none of them grant admin access.
#[derive(Debug, Clone)]
pub struct ShopifyConfig {
    /// Shopify store domain (e.g., your-store.myshopify.com)
    pub store: String,
    /// Shopify API version (e.g., 2026-01)
    pub api_version: String,
    /// Storefront API public access token
    pub storefront_public_token: String,
    /// Customer Account API numeric shop ID (found in Shopify admin URL)
    pub customer_shop_id: String,
    /// Customer Account API client ID
    pub customer_client_id: String,
}

/// SMTP configuration for verification code delivery.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: SecretString,
    /// Sender address (e.g., "Orchard <no-reply@example.com>")
    pub from_address: String,
}

/// Source of configuration values, keyed by variable name.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = Environment::parse(&get("ORCHARD_ENV").unwrap_or_default())?;
        let production = environment.is_production();

        let host = get("STOREFRONT_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_string())
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = parse_or_default(&get, "STOREFRONT_PORT", 3000_u16)?;

        let base_url = match get("STOREFRONT_BASE_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if production => {
                return Err(ConfigError::MissingEnvVar("STOREFRONT_BASE_URL".to_string()));
            }
            None => format!("http://localhost:{port}"),
        };

        let session_secret = match get("STOREFRONT_SESSION_SECRET") {
            Some(value) => {
                let secret = SecretString::from(value);
                validate_session_secret(&secret, "STOREFRONT_SESSION_SECRET")?;
                validate_secret_strength(secret.expose_secret(), "STOREFRONT_SESSION_SECRET")?;
                secret
            }
            None if production => {
                return Err(ConfigError::MissingEnvVar(
                    "STOREFRONT_SESSION_SECRET".to_string(),
                ));
            }
            None => {
                tracing::warn!(
                    "STOREFRONT_SESSION_SECRET not set; using an ephemeral secret, sessions will not survive a restart"
                );
                SecretString::from(generate_secret(DEV_SESSION_SECRET_LENGTH))
            }
        };

        let kv_url = get("ORCHARD_KV_URL")
            .or_else(|| get("DATABASE_URL"))
            .map(SecretString::from);
        if production && kv_url.is_none() {
            return Err(ConfigError::MissingEnvVar("ORCHARD_KV_URL".to_string()));
        }

        let shopify = ShopifyConfig::from_lookup(&get, production)?;
        let email = EmailConfig::from_lookup(&get)?;
        if production && email.is_none() {
            return Err(ConfigError::MissingEnvVar("SMTP_HOST".to_string()));
        }

        let upstream_timeout = Duration::from_secs(parse_or_default(
            &get,
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);

        Ok(Self {
            environment,
            host,
            port,
            base_url,
            session_secret,
            kv_url,
            shopify,
            email,
            upstream_timeout,
            sentry_dsn: get("SENTRY_DSN"),
            sentry_environment: get("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.environment.is_production() || self.base_url.starts_with("https://")
    }
}

impl ShopifyConfig {
    /// Storefront API GraphQL endpoint.
    #[must_use]
    pub fn storefront_endpoint(&self) -> String {
        format!("https://{}/api/{}/graphql.json", self.store, self.api_version)
    }

    /// Customer Account API GraphQL endpoint.
    #[must_use]
    pub fn customer_endpoint(&self) -> String {
        format!(
            "https://shopify.com/{}/account/customer/api/{}/graphql",
            self.customer_shop_id, self.api_version
        )
    }

    /// Base URL of the Customer Account OAuth endpoints.
    #[must_use]
    pub fn customer_auth_base(&self) -> String {
        format!("https://shopify.com/{}/auth/oauth", self.customer_shop_id)
    }

    /// Whether Customer Account login is configured.
    #[must_use]
    pub fn has_customer_accounts(&self) -> bool {
        !self.customer_client_id.is_empty() && self.customer_shop_id != "0"
    }

    fn from_lookup(
        get: &dyn Fn(&str) -> Option<String>,
        production: bool,
    ) -> Result<Self, ConfigError> {
        let required = |key: &str, dev_default: &str| match get(key) {
            Some(value) => Ok(value),
            None if production => Err(ConfigError::MissingEnvVar(key.to_string())),
            None => Ok(dev_default.to_string()),
        };

        Ok(Self {
            store: required("SHOPIFY_STORE", DEV_STORE)?,
            api_version: get("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            storefront_public_token: required("SHOPIFY_STOREFRONT_PUBLIC_TOKEN", "")?,
            customer_shop_id: required("SHOPIFY_CUSTOMER_SHOP_ID", "0")?,
            customer_client_id: required("SHOPIFY_CUSTOMER_CLIENT_ID", "")?,
        })
    }
}

impl EmailConfig {
    fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get("SMTP_HOST") else {
            return Ok(None);
        };
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_or_default(get, "SMTP_PORT", 587_u16)?,
            smtp_username: required("SMTP_USERNAME")?,
            smtp_password: SecretString::from(required("SMTP_PASSWORD")?),
            from_address: required("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a variable, falling back to a default when unset.
fn parse_or_default<T>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Generate a random alphanumeric secret suitable for session signing.
#[must_use]
pub fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|&b| char::from(b))
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
