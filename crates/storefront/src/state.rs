//! Application state shared across handlers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::StorefrontConfig;
use crate::gateway::{CommerceGateway, GatewayEndpoints, GatewayError};
use crate::kv::KvBackend;
use crate::services::auth::SessionTokens;
use crate::services::email::EmailService;
use crate::services::wishlist::WishlistLocks;
use crate::shopify::{CustomerClient, ShopifyError, StorefrontClient};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("shopify client: {0}")]
    Shopify(#[from] ShopifyError),
    #[error("commerce gateway: {0}")]
    Gateway(#[from] GatewayError),
    #[error("email service: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the KV store, upstream clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    kv: KvBackend,
    storefront: StorefrontClient,
    customer: CustomerClient,
    gateway: CommerceGateway,
    tokens: SessionTokens,
    email: Option<EmailService>,
    wishlist_locks: WishlistLocks,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream HTTP client or the SMTP transport
    /// cannot be built.
    pub fn new(config: StorefrontConfig, kv: KvBackend) -> Result<Self, StateError> {
        let timeout = config.upstream_timeout;
        let storefront = StorefrontClient::new(&config.shopify, timeout)?;
        let customer = CustomerClient::new(&config.shopify, timeout)?;
        let gateway = CommerceGateway::new(
            GatewayEndpoints::from_config(&config.shopify),
            config.environment,
            timeout,
        )?;
        let tokens = SessionTokens::new(config.session_secret.clone(), config.secure_cookies());
        let email = config.email.as_ref().map(EmailService::new).transpose()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                kv,
                storefront,
                customer,
                gateway,
                tokens,
                email,
                wishlist_locks: WishlistLocks::new(),
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the KV store.
    #[must_use]
    pub fn kv(&self) -> &KvBackend {
        &self.inner.kv
    }

    /// Get a reference to the Shopify Storefront API client.
    #[must_use]
    pub fn storefront(&self) -> &StorefrontClient {
        &self.inner.storefront
    }

    /// Get a reference to the Shopify Customer Account API client.
    #[must_use]
    pub fn customer(&self) -> &CustomerClient {
        &self.inner.customer
    }

    /// Get a reference to the GraphQL gateway.
    #[must_use]
    pub fn gateway(&self) -> &CommerceGateway {
        &self.inner.gateway
    }

    /// Get a reference to the session token issuer.
    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.inner.tokens
    }

    /// The SMTP sender, when configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// Per-owner wishlist write locks.
    #[must_use]
    pub fn wishlist_locks(&self) -> &WishlistLocks {
        &self.inner.wishlist_locks
    }
}

impl FromRef<AppState> for SessionTokens {
    fn from_ref(state: &AppState) -> Self {
        state.inner.tokens.clone()
    }
}

impl FromRef<AppState> for CustomerClient {
    fn from_ref(state: &AppState) -> Self {
        state.inner.customer.clone()
    }
}
