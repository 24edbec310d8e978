//! Cart state machine.
//!
//! A shopper either holds no cart identifier (`NoCart`) or holds one
//! (`CartActive`). The identifier lives in the browser session; the cart
//! itself lives upstream. Every operation returns the full refreshed cart.
//!
//! When upstream reports the held identifier as unknown the identifier is
//! dropped, so the next `add_item` starts a fresh cart.

use std::future::Future;

use thiserror::Error;
use tower_sessions::Session;
use tracing::{debug, info, instrument, warn};

use orchard_core::{CartId, CartLineId, VariantId};

use crate::models::keys;
use crate::services::auth::SessionClaims;
use crate::shopify::{
    BuyerIdentity, Cart, CartLineInput, CartLineUpdateInput, CustomerAccessToken, ShopifyError,
    StorefrontClient,
};

// =============================================================================
// Errors
// =============================================================================

/// Cart operation failures.
#[derive(Debug, Error)]
pub enum CartError {
    /// Upstream rejected the mutation; carries its first user error.
    #[error("{0}")]
    Rejected(String),

    /// The held cart no longer exists upstream; the identifier was dropped.
    #[error("cart expired")]
    Expired,

    /// The operation needs a cart and none is held.
    #[error("no cart")]
    NoCart,

    /// Quantities for new lines must be at least 1.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The browser session could not be read or written.
    #[error("cart storage error: {0}")]
    Storage(#[from] tower_sessions::session::Error),

    /// Upstream could not be reached or answered garbage.
    #[error("upstream error: {0}")]
    Upstream(ShopifyError),
}

impl From<ShopifyError> for CartError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::UserError(message) => Self::Rejected(message),
            ShopifyError::NotFound(_) => Self::Expired,
            other => Self::Upstream(other),
        }
    }
}

// =============================================================================
// Seams
// =============================================================================

/// Upstream cart operations.
pub trait CartApi: Send + Sync {
    /// Create a cart.
    fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        buyer_identity: Option<&BuyerIdentity>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    /// Fetch a cart; `None` if the identifier is unknown.
    fn get_cart(
        &self,
        cart_id: &CartId,
    ) -> impl Future<Output = Result<Option<Cart>, ShopifyError>> + Send;

    /// Add lines.
    fn add_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineInput>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    /// Change line quantities.
    fn update_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineUpdateInput>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    /// Remove lines.
    fn remove_lines(
        &self,
        cart_id: &CartId,
        line_ids: Vec<CartLineId>,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;

    /// Attach a buyer identity.
    fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        buyer_identity: &BuyerIdentity,
    ) -> impl Future<Output = Result<Cart, ShopifyError>> + Send;
}

impl CartApi for StorefrontClient {
    async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        buyer_identity: Option<&BuyerIdentity>,
    ) -> Result<Cart, ShopifyError> {
        Self::create_cart(self, lines, buyer_identity).await
    }

    async fn get_cart(&self, cart_id: &CartId) -> Result<Option<Cart>, ShopifyError> {
        Self::get_cart(self, cart_id).await
    }

    async fn add_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineInput>,
    ) -> Result<Cart, ShopifyError> {
        Self::add_lines(self, cart_id, lines).await
    }

    async fn update_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineUpdateInput>,
    ) -> Result<Cart, ShopifyError> {
        Self::update_lines(self, cart_id, lines).await
    }

    async fn remove_lines(
        &self,
        cart_id: &CartId,
        line_ids: Vec<CartLineId>,
    ) -> Result<Cart, ShopifyError> {
        Self::remove_lines(self, cart_id, line_ids).await
    }

    async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        buyer_identity: &BuyerIdentity,
    ) -> Result<Cart, ShopifyError> {
        Self::update_buyer_identity(self, cart_id, buyer_identity).await
    }
}

/// Where the held cart identifier is kept.
pub trait CartIdStore: Send + Sync {
    /// The held identifier, if any.
    fn load(&self) -> impl Future<Output = Result<Option<CartId>, CartError>> + Send;

    /// Hold `cart_id`, replacing any previous identifier.
    fn save(&self, cart_id: &CartId) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Forget the held identifier.
    fn clear(&self) -> impl Future<Output = Result<(), CartError>> + Send;
}

/// Cart identifier held in the browser session.
#[derive(Clone)]
pub struct SessionCartStore {
    session: Session,
}

impl SessionCartStore {
    /// Wrap a browser session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl CartIdStore for SessionCartStore {
    async fn load(&self) -> Result<Option<CartId>, CartError> {
        Ok(self.session.get::<CartId>(keys::CART_ID).await?)
    }

    async fn save(&self, cart_id: &CartId) -> Result<(), CartError> {
        Ok(self.session.insert(keys::CART_ID, cart_id).await?)
    }

    async fn clear(&self) -> Result<(), CartError> {
        self.session.remove::<CartId>(keys::CART_ID).await?;
        Ok(())
    }
}

/// Buyer identity for a signed-in shopper.
///
/// Needs a session issued through a Customer Account login (one carrying a
/// customer ID) and a live Customer Account token. An email-code session
/// never borrows a token left in the browser by an earlier login.
#[must_use]
pub fn resolve_buyer_identity(
    session: Option<&SessionClaims>,
    customer_token: Option<&CustomerAccessToken>,
) -> Option<BuyerIdentity> {
    let session = session.filter(|claims| claims.customer_id.is_some())?;
    let token = customer_token.filter(|token| !token.is_expired())?;
    Some(BuyerIdentity {
        email: Some(session.email.as_str().to_owned()),
        customer_access_token: Some(token.access_token.clone()),
    })
}

// =============================================================================
// State machine
// =============================================================================

/// One shopper's cart, bound to an upstream and an identifier store.
pub struct CartSession<'a, A, S> {
    api: &'a A,
    store: &'a S,
    buyer_identity: Option<BuyerIdentity>,
}

impl<'a, A: CartApi, S: CartIdStore> CartSession<'a, A, S> {
    /// Create a cart session. `buyer_identity` is attached to carts created
    /// from here on and by [`Self::associate_identity`].
    #[must_use]
    pub const fn new(api: &'a A, store: &'a S, buyer_identity: Option<BuyerIdentity>) -> Self {
        Self {
            api,
            store,
            buyer_identity,
        }
    }

    /// The held cart identifier.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the session cannot be read.
    pub async fn current_id(&self) -> Result<Option<CartId>, CartError> {
        self.store.load().await
    }

    /// Hold a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the session cannot be written.
    pub async fn seed(&self, cart_id: &CartId) -> Result<(), CartError> {
        if self.store.load().await?.as_ref() != Some(cart_id) {
            debug!(cart_id = %cart_id, "Seeding cart identifier");
            self.store.save(cart_id).await?;
        }
        Ok(())
    }

    /// Create an empty cart and hold it, replacing any held identifier.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` on user errors, `Upstream` on transport failure.
    #[instrument(skip(self))]
    pub async fn create(&self) -> Result<Cart, CartError> {
        let cart = self
            .api
            .create_cart(Vec::new(), self.buyer_identity.as_ref())
            .await?;
        self.store.save(&cart.id).await?;
        info!(cart_id = %cart.id, "Cart created");
        Ok(cart)
    }

    /// Add `quantity` of `variant_id`, creating the cart if none is held.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for quantities below 1, `Rejected` on user
    /// errors, `Expired` if the held cart vanished upstream.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn add_item(&self, variant_id: VariantId, quantity: i64) -> Result<Cart, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }
        let lines = vec![CartLineInput {
            merchandise_id: variant_id,
            quantity,
        }];

        match self.store.load().await? {
            None => {
                let cart = self
                    .api
                    .create_cart(lines, self.buyer_identity.as_ref())
                    .await?;
                self.store.save(&cart.id).await?;
                info!(cart_id = %cart.id, "Cart created with first line");
                Ok(cart)
            }
            Some(cart_id) => {
                let result = self.api.add_lines(&cart_id, lines).await;
                self.settle(result).await
            }
        }
    }

    /// Set a line's quantity; below 1 removes the line.
    ///
    /// # Errors
    ///
    /// Returns `NoCart` without a held cart, `Rejected` on user errors,
    /// `Expired` if the held cart vanished upstream.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_item(&self, line_id: CartLineId, quantity: i64) -> Result<Cart, CartError> {
        if quantity < 1 {
            return self.remove_item(line_id).await;
        }
        let cart_id = self.require_id().await?;
        let result = self
            .api
            .update_lines(
                &cart_id,
                vec![CartLineUpdateInput {
                    id: line_id,
                    quantity,
                }],
            )
            .await;
        self.settle(result).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `NoCart` without a held cart, `Rejected` on user errors,
    /// `Expired` if the held cart vanished upstream.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_item(&self, line_id: CartLineId) -> Result<Cart, CartError> {
        let cart_id = self.require_id().await?;
        let result = self.api.remove_lines(&cart_id, vec![line_id]).await;
        self.settle(result).await
    }

    /// Attach the signed-in buyer to the held cart.
    ///
    /// Without a resolvable identity, or if upstream refuses it, the cart is
    /// returned unchanged. `None` means no cart is held.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` only if the cart cannot be read at all.
    #[instrument(skip(self))]
    pub async fn associate_identity(&self) -> Result<Option<Cart>, CartError> {
        let Some(cart_id) = self.store.load().await? else {
            return Ok(None);
        };
        let Some(identity) = self.buyer_identity.as_ref() else {
            debug!("No buyer identity to attach; leaving cart unchanged");
            return self.refresh().await;
        };

        match self.api.update_buyer_identity(&cart_id, identity).await {
            Ok(cart) => {
                info!(cart_id = %cart.id, "Buyer identity attached to cart");
                Ok(Some(cart))
            }
            Err(ShopifyError::NotFound(_)) => {
                self.store.clear().await?;
                info!(cart_id = %cart_id, "Held cart no longer exists; dropped identifier");
                Ok(None)
            }
            Err(ShopifyError::UserError(message)) => {
                warn!(cart_id = %cart_id, error = %message, "Buyer identity refused; cart unchanged");
                self.refresh().await
            }
            Err(e) => Err(CartError::Upstream(e)),
        }
    }

    /// Re-fetch the held cart.
    ///
    /// Transport failures are retried once. An unknown identifier is dropped
    /// and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if both attempts fail.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Option<Cart>, CartError> {
        let Some(cart_id) = self.store.load().await? else {
            return Ok(None);
        };

        let fetched = match self.api.get_cart(&cart_id).await {
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Cart fetch failed; retrying once");
                self.api.get_cart(&cart_id).await
            }
            other => other,
        };

        match fetched.map_err(CartError::Upstream)? {
            Some(cart) => Ok(Some(cart)),
            None => {
                self.store.clear().await?;
                info!(cart_id = %cart_id, "Held cart no longer exists; dropped identifier");
                Ok(None)
            }
        }
    }

    async fn require_id(&self) -> Result<CartId, CartError> {
        self.store.load().await?.ok_or(CartError::NoCart)
    }

    /// Map a mutation result, dropping the identifier if the cart vanished.
    async fn settle(&self, result: Result<Cart, ShopifyError>) -> Result<Cart, CartError> {
        match result {
            Ok(cart) => Ok(cart),
            Err(ShopifyError::NotFound(_)) => {
                self.store.clear().await?;
                info!("Held cart no longer exists; dropped identifier");
                Err(CartError::Expired)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use orchard_core::{CustomerId, Email, Money, ProductId};
    use tokio::sync::Mutex;

    use super::*;
    use crate::shopify::{CartCost, CartLine, CartLineCost, CartMerchandise};

    // =========================================================================
    // Fakes
    // =========================================================================

    #[derive(Default)]
    struct MemoryCartIdStore {
        id: Mutex<Option<CartId>>,
    }

    impl MemoryCartIdStore {
        async fn holding(id: &str) -> Self {
            let store = Self::default();
            *store.id.lock().await = Some(CartId::new(id));
            store
        }
    }

    impl CartIdStore for MemoryCartIdStore {
        async fn load(&self) -> Result<Option<CartId>, CartError> {
            Ok(self.id.lock().await.clone())
        }

        async fn save(&self, cart_id: &CartId) -> Result<(), CartError> {
            *self.id.lock().await = Some(cart_id.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), CartError> {
            *self.id.lock().await = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeState {
        carts: HashMap<CartId, Vec<(CartLineId, VariantId, i64)>>,
        identities: HashMap<CartId, BuyerIdentity>,
        next_id: u32,
    }

    /// In-memory upstream. Variant `sold-out` is rejected with a user error.
    #[derive(Default)]
    struct FakeCartApi {
        state: Mutex<FakeState>,
        failing_reads: AtomicUsize,
        reads: AtomicUsize,
        mutations: AtomicUsize,
        reject_identity: bool,
    }

    fn money() -> Money {
        Money::zero("USD")
    }

    fn snapshot(state: &FakeState, id: &CartId) -> Cart {
        let lines = state.carts.get(id).cloned().unwrap_or_default();
        let identity = state.identities.get(id);
        Cart {
            id: id.clone(),
            checkout_url: format!("https://shop.example/checkout/{id}"),
            total_quantity: lines.iter().map(|(_, _, quantity)| quantity).sum(),
            lines: lines
                .into_iter()
                .map(|(line_id, variant, quantity)| CartLine {
                    id: line_id,
                    quantity,
                    cost: CartLineCost {
                        amount_per_quantity: money(),
                        total_amount: money(),
                    },
                    merchandise: CartMerchandise {
                        id: variant,
                        title: "Default Title".into(),
                        product_id: ProductId::new("gid://shopify/Product/1"),
                        product_title: "Apple".into(),
                        product_handle: "apple".into(),
                        image: None,
                        price: money(),
                    },
                })
                .collect(),
            cost: CartCost {
                subtotal_amount: money(),
                total_amount: money(),
                total_tax_amount: None,
                shipping_amount: None,
            },
            buyer_identity: identity.map(|identity| crate::shopify::CartBuyerIdentity {
                email: identity.email.clone(),
                customer_id: None,
            }),
        }
    }

    fn push_lines(
        state: &mut FakeState,
        id: &CartId,
        lines: Vec<CartLineInput>,
    ) -> Result<(), ShopifyError> {
        if lines.iter().any(|line| line.merchandise_id.as_str() == "sold-out") {
            return Err(ShopifyError::UserError("Sold out".into()));
        }
        for line in lines {
            state.next_id += 1;
            let line_id = CartLineId::new(format!("gid://shopify/CartLine/{}", state.next_id));
            state
                .carts
                .entry(id.clone())
                .or_default()
                .push((line_id, line.merchandise_id, line.quantity));
        }
        Ok(())
    }

    fn not_found() -> ShopifyError {
        ShopifyError::NotFound("cart".into())
    }

    impl CartApi for FakeCartApi {
        async fn create_cart(
            &self,
            lines: Vec<CartLineInput>,
            buyer_identity: Option<&BuyerIdentity>,
        ) -> Result<Cart, ShopifyError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if lines.iter().any(|line| line.merchandise_id.as_str() == "sold-out") {
                return Err(ShopifyError::UserError("Sold out".into()));
            }
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = CartId::new(format!("gid://shopify/Cart/c{}", state.next_id));
            state.carts.insert(id.clone(), Vec::new());
            push_lines(&mut state, &id, lines)?;
            if let Some(identity) = buyer_identity {
                state.identities.insert(id.clone(), identity.clone());
            }
            Ok(snapshot(&state, &id))
        }

        async fn get_cart(&self, cart_id: &CartId) -> Result<Option<Cart>, ShopifyError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ShopifyError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            let state = self.state.lock().await;
            Ok(state
                .carts
                .contains_key(cart_id)
                .then(|| snapshot(&state, cart_id)))
        }

        async fn add_lines(
            &self,
            cart_id: &CartId,
            lines: Vec<CartLineInput>,
        ) -> Result<Cart, ShopifyError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().await;
            if !state.carts.contains_key(cart_id) {
                return Err(not_found());
            }
            push_lines(&mut state, cart_id, lines)?;
            Ok(snapshot(&state, cart_id))
        }

        async fn update_lines(
            &self,
            cart_id: &CartId,
            lines: Vec<CartLineUpdateInput>,
        ) -> Result<Cart, ShopifyError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().await;
            let Some(held) = state.carts.get_mut(cart_id) else {
                return Err(not_found());
            };
            for update in lines {
                for line in held.iter_mut().filter(|line| line.0 == update.id) {
                    line.2 = update.quantity;
                }
            }
            Ok(snapshot(&state, cart_id))
        }

        async fn remove_lines(
            &self,
            cart_id: &CartId,
            line_ids: Vec<CartLineId>,
        ) -> Result<Cart, ShopifyError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().await;
            let Some(held) = state.carts.get_mut(cart_id) else {
                return Err(not_found());
            };
            held.retain(|line| !line_ids.contains(&line.0));
            Ok(snapshot(&state, cart_id))
        }

        async fn update_buyer_identity(
            &self,
            cart_id: &CartId,
            buyer_identity: &BuyerIdentity,
        ) -> Result<Cart, ShopifyError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            if self.reject_identity {
                return Err(ShopifyError::UserError("Customer access token is invalid".into()));
            }
            let mut state = self.state.lock().await;
            if !state.carts.contains_key(cart_id) {
                return Err(not_found());
            }
            state
                .identities
                .insert(cart_id.clone(), buyer_identity.clone());
            Ok(snapshot(&state, cart_id))
        }
    }

    fn identity() -> BuyerIdentity {
        BuyerIdentity {
            email: Some("shopper@example.com".into()),
            customer_access_token: Some("shcat_token".into()),
        }
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_add_then_zero_quantity_removes_line() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let cart = carts.add_item(VariantId::new("variant-1"), 2).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.total_quantity, 2);
        assert_eq!(store.load().await.unwrap(), Some(cart.id.clone()));

        let line_id = cart.lines.first().unwrap().id.clone();
        let cart_after = carts.update_item(line_id, 0).await.unwrap();
        assert_eq!(cart_after.id, cart.id);
        assert!(cart_after.lines.is_empty());
        assert_eq!(cart_after.total_quantity, 0);
    }

    #[tokio::test]
    async fn test_second_add_reuses_held_cart() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let first = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();
        let second = carts.add_item(VariantId::new("variant-2"), 3).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.lines.len(), 2);
        assert_eq!(second.total_quantity, 4);
    }

    #[tokio::test]
    async fn test_update_item_changes_quantity() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();
        let line_id = cart.lines.first().unwrap().id.clone();
        let cart = carts.update_item(line_id, 5).await.unwrap();
        assert_eq!(cart.total_quantity, 5);
    }

    #[tokio::test]
    async fn test_invalid_quantity_makes_no_call() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let result = carts.add_item(VariantId::new("variant-1"), 0).await;
        assert!(matches!(result, Err(CartError::InvalidQuantity)));
        assert_eq!(api.mutations.load(Ordering::SeqCst), 0);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_error_surfaces_and_keeps_state() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();
        let result = carts.add_item(VariantId::new("sold-out"), 1).await;
        match result {
            Err(CartError::Rejected(message)) => assert_eq!(message, "Sold out"),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(store.load().await.unwrap(), Some(cart.id.clone()));
        let refreshed = carts.refresh().await.unwrap().unwrap();
        assert_eq!(refreshed.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_create_holds_nothing() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let result = carts.add_item(VariantId::new("sold-out"), 1).await;
        assert!(matches!(result, Err(CartError::Rejected(_))));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_cart_is_dropped_then_recreated() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::holding("gid://shopify/Cart/gone").await;
        let carts = CartSession::new(&api, &store, None);

        let result = carts.add_item(VariantId::new("variant-1"), 1).await;
        assert!(matches!(result, Err(CartError::Expired)));
        assert_eq!(store.load().await.unwrap(), None);

        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();
        assert_ne!(cart.id.as_str(), "gid://shopify/Cart/gone");
        assert_eq!(store.load().await.unwrap(), Some(cart.id));
    }

    #[tokio::test]
    async fn test_refresh_unknown_cart_clears_identifier() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::holding("gid://shopify/Cart/gone").await;
        let carts = CartSession::new(&api, &store, None);

        assert!(carts.refresh().await.unwrap().is_none());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_without_cart_is_none() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        assert!(carts.refresh().await.unwrap().is_none());
        assert_eq!(api.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_retries_transport_failure_once() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);
        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();

        api.failing_reads.store(1, Ordering::SeqCst);
        let refreshed = carts.refresh().await.unwrap().unwrap();
        assert_eq!(refreshed.id, cart.id);
        assert_eq!(api.reads.load(Ordering::SeqCst), 2);

        api.failing_reads.store(2, Ordering::SeqCst);
        assert!(matches!(carts.refresh().await, Err(CartError::Upstream(_))));
        assert_eq!(store.load().await.unwrap(), Some(cart.id));
    }

    #[tokio::test]
    async fn test_mutations_without_cart_need_one() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let line = CartLineId::new("gid://shopify/CartLine/1");
        assert!(matches!(
            carts.update_item(line.clone(), 2).await,
            Err(CartError::NoCart)
        ));
        assert!(matches!(carts.remove_item(line).await, Err(CartError::NoCart)));
    }

    #[tokio::test]
    async fn test_cart_survives_login() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();

        let anonymous = CartSession::new(&api, &store, None);
        let cart = anonymous.add_item(VariantId::new("variant-1"), 2).await.unwrap();

        let signed_in = CartSession::new(&api, &store, Some(identity()));
        let associated = signed_in.associate_identity().await.unwrap().unwrap();
        assert_eq!(associated.id, cart.id);
        assert_eq!(
            associated.buyer_identity.unwrap().email.as_deref(),
            Some("shopper@example.com")
        );

        let refreshed = signed_in.refresh().await.unwrap().unwrap();
        assert_eq!(refreshed.id, cart.id);
        assert_eq!(refreshed.lines.len(), cart.lines.len());
    }

    #[tokio::test]
    async fn test_associate_without_identity_returns_cart_unchanged() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);
        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();
        let before = api.mutations.load(Ordering::SeqCst);

        let same = carts.associate_identity().await.unwrap().unwrap();
        assert_eq!(same.id, cart.id);
        assert_eq!(api.mutations.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_associate_refused_identity_degrades() {
        let api = FakeCartApi {
            reject_identity: true,
            ..FakeCartApi::default()
        };
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, Some(identity()));
        let cart = carts.add_item(VariantId::new("variant-1"), 1).await.unwrap();

        let same = carts.associate_identity().await.unwrap().unwrap();
        assert_eq!(same.id, cart.id);
        assert_eq!(same.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_associate_without_cart_is_none() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, Some(identity()));

        assert!(carts.associate_identity().await.unwrap().is_none());
        assert_eq!(api.mutations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_created_cart_carries_identity() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, Some(identity()));

        let cart = carts.create().await.unwrap();
        assert!(cart.lines.is_empty());
        assert!(cart.buyer_identity.is_some());
        assert_eq!(store.load().await.unwrap(), Some(cart.id));
    }

    #[tokio::test]
    async fn test_seed_holds_supplied_identifier() {
        let api = FakeCartApi::default();
        let store = MemoryCartIdStore::default();
        let carts = CartSession::new(&api, &store, None);

        let id = CartId::new("gid://shopify/Cart/from-client");
        carts.seed(&id).await.unwrap();
        assert_eq!(carts.current_id().await.unwrap(), Some(id));
    }

    #[test]
    fn test_buyer_identity_needs_session_and_live_token() {
        let claims = SessionClaims {
            email: Email::parse("shopper@example.com").unwrap(),
            customer_id: Some(CustomerId::new("gid://shopify/Customer/1")),
            iat: 0,
            exp: i64::MAX,
        };
        let token = CustomerAccessToken {
            access_token: "shcat_live".into(),
            id_token: None,
            refresh_token: None,
            expires_in: Some(3600),
            obtained_at: Utc::now().timestamp(),
        };
        let expired = CustomerAccessToken {
            obtained_at: Utc::now().timestamp() - 7200,
            ..token.clone()
        };

        let identity = resolve_buyer_identity(Some(&claims), Some(&token)).unwrap();
        assert_eq!(identity.email.as_deref(), Some("shopper@example.com"));
        assert_eq!(identity.customer_access_token.as_deref(), Some("shcat_live"));

        assert!(resolve_buyer_identity(Some(&claims), None).is_none());
        assert!(resolve_buyer_identity(None, Some(&token)).is_none());
        assert!(resolve_buyer_identity(Some(&claims), Some(&expired)).is_none());
    }

    #[test]
    fn test_email_code_session_ignores_leftover_customer_token() {
        let code_login = SessionClaims {
            email: Email::parse("b@example.com").unwrap(),
            customer_id: None,
            iat: 0,
            exp: i64::MAX,
        };
        let other_customers_token = CustomerAccessToken {
            access_token: "shcat_customer_a".into(),
            id_token: None,
            refresh_token: None,
            expires_in: Some(3600),
            obtained_at: Utc::now().timestamp(),
        };

        assert!(resolve_buyer_identity(Some(&code_login), Some(&other_customers_token)).is_none());
    }
}
