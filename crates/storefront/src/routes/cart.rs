//! Cart route handlers.
//!
//! Every mutation answers with the full refreshed cart. The held cart
//! identifier lives in the browser session; callers may also pass `cartId`,
//! which replaces the held one.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use orchard_core::{CartId, CartLineId, VariantId};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{CurrentSession, OptionalShopifyCustomer};
use crate::services::cart::{CartSession, SessionCartStore, resolve_buyer_identity};
use crate::shopify::Cart;
use crate::state::AppState;

const fn one() -> i64 {
    1
}

/// A cart mutation, discriminated by `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CartAction {
    /// Start an empty cart.
    Create,
    /// Add a variant, creating the cart if needed.
    AddItem {
        variant_id: VariantId,
        #[serde(default = "one")]
        quantity: i64,
    },
    /// Remove a line.
    RemoveItem { line_id: CartLineId },
    /// Change a line's quantity; below 1 removes it.
    UpdateItem { line_id: CartLineId, quantity: i64 },
    /// Attach the signed-in shopper to the held cart.
    UpdateBuyerIdentity,
}

/// `POST /cart` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartRequest {
    #[serde(flatten)]
    pub action: CartAction,
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

/// `GET /cart` query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartQuery {
    pub cart_id: Option<CartId>,
}

/// Cart snapshot response; `null` when no cart is held.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Option<Cart>,
}

/// The held cart.
///
/// # Route
///
/// `GET /cart?cartId=`
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartResponse>> {
    let store = SessionCartStore::new(session);
    let carts = CartSession::new(state.storefront(), &store, None);
    if let Some(cart_id) = &query.cart_id {
        carts.seed(cart_id).await?;
    }

    Ok(Json(CartResponse {
        cart: carts.refresh().await?,
    }))
}

/// Apply a cart mutation.
///
/// # Route
///
/// `POST /cart`
pub async fn mutate(
    State(state): State<AppState>,
    session: Session,
    CurrentSession(claims): CurrentSession,
    OptionalShopifyCustomer(customer_token): OptionalShopifyCustomer,
    Json(request): Json<CartRequest>,
) -> Result<Json<CartResponse>> {
    let store = SessionCartStore::new(session);
    let identity = resolve_buyer_identity(claims.as_ref(), customer_token.as_ref());
    let carts = CartSession::new(state.storefront(), &store, identity);
    if let Some(cart_id) = &request.cart_id {
        carts.seed(cart_id).await?;
    }

    let cart = match request.action {
        CartAction::Create => Some(carts.create().await?),
        CartAction::AddItem {
            variant_id,
            quantity,
        } => {
            add_breadcrumb(
                "cart",
                "Added item",
                Some(&[("variant_id", variant_id.as_str())]),
            );
            Some(carts.add_item(variant_id, quantity).await?)
        }
        CartAction::RemoveItem { line_id } => {
            add_breadcrumb("cart", "Removed item", Some(&[("line_id", line_id.as_str())]));
            Some(carts.remove_item(line_id).await?)
        }
        CartAction::UpdateItem { line_id, quantity } => {
            add_breadcrumb("cart", "Updated item", Some(&[("line_id", line_id.as_str())]));
            Some(carts.update_item(line_id, quantity).await?)
        }
        CartAction::UpdateBuyerIdentity => carts.associate_identity().await?,
    };

    Ok(Json(CartResponse { cart }))
}
