//! Wishlist reconciliation.
//!
//! Guests keep their wishlist in the browser session. Signed-in customers keep
//! it in a JSON metafield on their Customer Account profile. On login the two
//! sets are merged once; the guest copy is cleared only after the merged set
//! has been written upstream.
//!
//! Writes for one owner are serialized through [`WishlistLocks`], so two
//! toggles racing on the same product always cancel out.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_sessions::Session;
use tracing::{debug, info, instrument, warn};

use orchard_core::{CustomerId, ProductId};

use crate::models::keys;
use crate::shopify::{CustomerClient, ShopifyError, StorefrontClient, WishlistProduct};

/// Wishlist operation failures.
#[derive(Debug, Error)]
pub enum WishlistError {
    /// Customer Account or Storefront API failure.
    #[error("upstream error: {0}")]
    Upstream(#[from] ShopifyError),

    /// The browser session could not be read or written.
    #[error("wishlist storage error: {0}")]
    Storage(#[from] tower_sessions::session::Error),

    /// The stored wishlist is not a JSON array.
    #[error("stored wishlist is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// Seams
// =============================================================================

/// Wishlist persisted on the customer's profile.
pub trait WishlistProfile: Send + Sync {
    /// Stored IDs; empty if the profile has none yet.
    fn load(&self) -> impl Future<Output = Result<Vec<ProductId>, WishlistError>> + Send;

    /// Replace the stored IDs.
    fn save(&self, ids: &[ProductId]) -> impl Future<Output = Result<(), WishlistError>> + Send;
}

/// Wishlist persisted for an anonymous shopper.
pub trait GuestWishlistStore: Send + Sync {
    /// Stored IDs; empty if none.
    fn load(&self) -> impl Future<Output = Result<Vec<ProductId>, WishlistError>> + Send;

    /// Replace the stored IDs.
    fn save(&self, ids: &[ProductId]) -> impl Future<Output = Result<(), WishlistError>> + Send;

    /// Forget the stored IDs.
    fn clear(&self) -> impl Future<Output = Result<(), WishlistError>> + Send;
}

/// Batch product lookup for display.
pub trait ProductResolver: Send + Sync {
    /// Products for `ids` that still exist, in input order.
    fn resolve(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<WishlistProduct>, ShopifyError>> + Send;
}

impl ProductResolver for StorefrontClient {
    async fn resolve(&self, ids: &[ProductId]) -> Result<Vec<WishlistProduct>, ShopifyError> {
        self.products_by_ids(ids).await
    }
}

/// The `custom.wishlist` metafield of a signed-in customer.
pub struct CustomerWishlistProfile<'a> {
    client: &'a CustomerClient,
    access_token: &'a str,
    customer_id: &'a CustomerId,
}

impl<'a> CustomerWishlistProfile<'a> {
    /// Bind to one customer's profile.
    #[must_use]
    pub const fn new(
        client: &'a CustomerClient,
        access_token: &'a str,
        customer_id: &'a CustomerId,
    ) -> Self {
        Self {
            client,
            access_token,
            customer_id,
        }
    }
}

impl WishlistProfile for CustomerWishlistProfile<'_> {
    async fn load(&self) -> Result<Vec<ProductId>, WishlistError> {
        let metafield = self.client.get_wishlist(self.access_token).await?;
        match metafield.value.as_deref() {
            None => Ok(Vec::new()),
            Some(raw) => parse_ids(raw),
        }
    }

    async fn save(&self, ids: &[ProductId]) -> Result<(), WishlistError> {
        let value = serde_json::to_string(ids)?;
        self.client
            .set_wishlist(self.access_token, self.customer_id, &value)
            .await?;
        Ok(())
    }
}

/// Guest wishlist held in the browser session.
#[derive(Clone)]
pub struct SessionGuestWishlist {
    session: Session,
}

impl SessionGuestWishlist {
    /// Wrap a browser session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl GuestWishlistStore for SessionGuestWishlist {
    async fn load(&self) -> Result<Vec<ProductId>, WishlistError> {
        Ok(self
            .session
            .get::<Vec<ProductId>>(keys::GUEST_WISHLIST)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, ids: &[ProductId]) -> Result<(), WishlistError> {
        self.session.insert(keys::GUEST_WISHLIST, ids).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), WishlistError> {
        self.session
            .remove::<Vec<ProductId>>(keys::GUEST_WISHLIST)
            .await?;
        Ok(())
    }
}

/// Parse a stored wishlist: a JSON array of ID strings. Non-string entries
/// and duplicates are dropped.
///
/// # Errors
///
/// Returns `Corrupt` if `raw` is not a JSON array.
pub fn parse_ids(raw: &str) -> Result<Vec<ProductId>, WishlistError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    Ok(dedupe(
        values
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(ProductId::from),
    ))
}

fn dedupe(ids: impl IntoIterator<Item = ProductId>) -> Vec<ProductId> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Union of `authenticated` and `guest`, authenticated entries first.
#[must_use]
pub fn merge(authenticated: &[ProductId], guest: &[ProductId]) -> Vec<ProductId> {
    dedupe(authenticated.iter().chain(guest).cloned())
}

// =============================================================================
// Locks
// =============================================================================

/// Per-owner write locks, evicted after ten idle minutes.
#[derive(Clone)]
pub struct WishlistLocks {
    locks: Cache<String, Arc<Mutex<()>>>,
}

impl Default for WishlistLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl WishlistLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(Duration::from_secs(600))
                .build(),
        }
    }

    async fn lock_for(&self, owner: &str) -> Arc<Mutex<()>> {
        self.locks
            .get_with(owner.to_owned(), async { Arc::new(Mutex::new(())) })
            .await
    }

    /// Hold `owner`'s write lock. An owner-less wishlist has nothing stored
    /// yet to race on and takes no lock.
    async fn acquire(&self, owner: Option<&str>) -> Option<OwnedMutexGuard<()>> {
        let owner = owner?;
        Some(self.lock_for(owner).await.lock_owned().await)
    }
}

/// Lock key for a signed-in customer.
#[must_use]
pub fn customer_owner(customer_id: &CustomerId) -> String {
    format!("customer:{customer_id}")
}

/// Lock key for an anonymous browser session; `None` until the session
/// has been saved once.
#[must_use]
pub fn guest_owner(session: &Session) -> Option<String> {
    session.id().map(|id| format!("guest:{id}"))
}

// =============================================================================
// Engine
// =============================================================================

/// Result of a toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toggled {
    /// The wishlist after the toggle.
    pub ids: Vec<ProductId>,
    /// Whether the toggled product is now on the wishlist.
    pub member: bool,
}

/// A shopper's wishlist: guest-backed, or profile-backed once signed in.
pub struct Wishlist<'a, P, G> {
    profile: Option<&'a P>,
    guest: &'a G,
    locks: &'a WishlistLocks,
    owner: Option<String>,
}

impl<'a, P: WishlistProfile, G: GuestWishlistStore> Wishlist<'a, P, G> {
    /// Wishlist of an anonymous shopper.
    #[must_use]
    pub const fn guest(guest: &'a G, locks: &'a WishlistLocks, owner: Option<String>) -> Self {
        Self {
            profile: None,
            guest,
            locks,
            owner,
        }
    }

    /// Wishlist of a signed-in customer. `guest` is only read during
    /// [`Self::on_login`].
    #[must_use]
    pub const fn authenticated(
        profile: &'a P,
        guest: &'a G,
        locks: &'a WishlistLocks,
        owner: String,
    ) -> Self {
        Self {
            profile: Some(profile),
            guest,
            locks,
            owner: Some(owner),
        }
    }

    /// Whether this wishlist is profile-backed.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.profile.is_some()
    }

    /// The current set of product IDs.
    ///
    /// # Errors
    ///
    /// Returns the backing store's failure.
    pub async fn ids(&self) -> Result<Vec<ProductId>, WishlistError> {
        match self.profile {
            Some(profile) => profile.load().await,
            None => self.guest.load().await,
        }
    }

    /// Whether `product_id` is on the wishlist.
    ///
    /// # Errors
    ///
    /// Returns the backing store's failure.
    pub async fn is_member(&self, product_id: &ProductId) -> Result<bool, WishlistError> {
        Ok(self.ids().await?.contains(product_id))
    }

    /// Add `product_id` if absent, remove it if present.
    ///
    /// # Errors
    ///
    /// Returns the backing store's failure; the stored set is unchanged.
    #[instrument(skip(self), fields(owner = ?self.owner, product_id = %product_id))]
    pub async fn toggle(&self, product_id: ProductId) -> Result<Toggled, WishlistError> {
        let _guard = self.locks.acquire(self.owner.as_deref()).await;

        let mut ids = self.ids().await?;
        let member = if let Some(pos) = ids.iter().position(|id| *id == product_id) {
            ids.remove(pos);
            false
        } else {
            ids.push(product_id);
            true
        };

        match self.profile {
            Some(profile) => profile.save(&ids).await?,
            None => self.guest.save(&ids).await?,
        }

        debug!(member, count = ids.len(), "Wishlist toggled");
        Ok(Toggled { ids, member })
    }

    /// Merge the guest wishlist into the profile.
    ///
    /// The merged set is written only if the guest set adds something. The
    /// guest copy is cleared only after that write succeeds, so a failed
    /// merge can be retried. Returns the working set. A guest wishlist just
    /// returns its own IDs.
    ///
    /// # Errors
    ///
    /// Returns the failing store's error; the guest copy is then untouched.
    #[instrument(skip(self), fields(owner = ?self.owner))]
    pub async fn on_login(&self) -> Result<Vec<ProductId>, WishlistError> {
        let Some(profile) = self.profile else {
            return self.guest.load().await;
        };

        let _guard = self.locks.acquire(self.owner.as_deref()).await;

        let authenticated = profile.load().await?;
        let guest = self.guest.load().await?;
        if guest.is_empty() {
            return Ok(authenticated);
        }

        let merged = merge(&authenticated, &guest);
        if merged.len() > authenticated.len() {
            if let Err(e) = profile.save(&merged).await {
                warn!(error = %e, guest_count = guest.len(), "Wishlist merge write failed; guest copy kept");
                return Err(e);
            }
            info!(
                added = merged.len() - authenticated.len(),
                total = merged.len(),
                "Guest wishlist merged into profile"
            );
        }

        self.guest.clear().await?;
        Ok(merged)
    }

    /// Product snapshots for the wishlist, in wishlist order.
    ///
    /// IDs that no longer resolve are left out of the result but stay on the
    /// stored wishlist.
    ///
    /// # Errors
    ///
    /// Returns the backing store's or resolver's failure.
    pub async fn products<R: ProductResolver>(
        &self,
        resolver: &R,
    ) -> Result<(Vec<ProductId>, Vec<WishlistProduct>), WishlistError> {
        let ids = self.ids().await?;
        if ids.is_empty() {
            return Ok((ids, Vec::new()));
        }
        let products = resolver.resolve(&ids).await?;
        if products.len() < ids.len() {
            debug!(
                hidden = ids.len() - products.len(),
                "Wishlist has products that no longer resolve"
            );
        }
        Ok((ids, products))
    }
}
