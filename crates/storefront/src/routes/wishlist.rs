//! Wishlist route handlers.
//!
//! Guests keep their wishlist in the browser session. Shoppers signed in
//! through Customer Accounts keep it on their profile.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use orchard_core::{CustomerId, ProductId};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{CurrentSession, OptionalShopifyCustomer};
use crate::services::auth::SessionClaims;
use crate::services::wishlist::{
    CustomerWishlistProfile, SessionGuestWishlist, Toggled, Wishlist, customer_owner, guest_owner,
};
use crate::shopify::{CustomerAccessToken, WishlistProduct};
use crate::state::AppState;

/// `GET /wishlist` response.
#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub ids: Vec<ProductId>,
    pub products: Vec<WishlistProduct>,
}

/// `POST /wishlist/toggle` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub product_id: ProductId,
}

/// `GET /wishlist/contains` query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainsQuery {
    pub product_id: ProductId,
}

/// `GET /wishlist/contains` response.
#[derive(Debug, Serialize)]
pub struct ContainsResponse {
    pub member: bool,
}

/// The profile wishlist for a shopper signed in with a live Customer
/// Account token, with the customer it belongs to.
pub(crate) fn customer_profile<'a>(
    state: &'a AppState,
    claims: Option<&'a SessionClaims>,
    token: Option<&'a CustomerAccessToken>,
) -> Option<(CustomerWishlistProfile<'a>, &'a CustomerId)> {
    let customer_id = claims?.customer_id.as_ref()?;
    let token = token.filter(|token| !token.is_expired())?;
    Some((
        CustomerWishlistProfile::new(state.customer(), &token.access_token, customer_id),
        customer_id,
    ))
}

fn bind<'a, 'p: 'a>(
    state: &'a AppState,
    session: &Session,
    guest: &'a SessionGuestWishlist,
    profile: Option<&'a (CustomerWishlistProfile<'p>, &'p CustomerId)>,
) -> Wishlist<'a, CustomerWishlistProfile<'p>, SessionGuestWishlist> {
    let locks = state.wishlist_locks();
    match profile {
        Some((profile, customer_id)) => {
            Wishlist::authenticated(profile, guest, locks, customer_owner(customer_id))
        }
        None => Wishlist::guest(guest, locks, guest_owner(session)),
    }
}

/// The wishlist with product snapshots.
///
/// # Route
///
/// `GET /wishlist`
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CurrentSession(claims): CurrentSession,
    OptionalShopifyCustomer(token): OptionalShopifyCustomer,
) -> Result<Json<WishlistResponse>> {
    let guest = SessionGuestWishlist::new(session.clone());
    let profile = customer_profile(&state, claims.as_ref(), token.as_ref());
    let wishlist = bind(&state, &session, &guest, profile.as_ref());

    let (ids, products) = wishlist.products(state.storefront()).await?;
    Ok(Json(WishlistResponse { ids, products }))
}

/// Add or remove a product.
///
/// # Route
///
/// `POST /wishlist/toggle`
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    CurrentSession(claims): CurrentSession,
    OptionalShopifyCustomer(token): OptionalShopifyCustomer,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<Toggled>> {
    let guest = SessionGuestWishlist::new(session.clone());
    let profile = customer_profile(&state, claims.as_ref(), token.as_ref());
    let wishlist = bind(&state, &session, &guest, profile.as_ref());

    let product_id = body.product_id;
    add_breadcrumb(
        "wishlist",
        "Toggled product",
        Some(&[("product_id", product_id.as_str())]),
    );
    Ok(Json(wishlist.toggle(product_id).await?))
}

/// Whether a product is on the wishlist.
///
/// # Route
///
/// `GET /wishlist/contains?productId=`
pub async fn contains(
    State(state): State<AppState>,
    session: Session,
    CurrentSession(claims): CurrentSession,
    OptionalShopifyCustomer(token): OptionalShopifyCustomer,
    Query(query): Query<ContainsQuery>,
) -> Result<Json<ContainsResponse>> {
    let guest = SessionGuestWishlist::new(session.clone());
    let profile = customer_profile(&state, claims.as_ref(), token.as_ref());
    let wishlist = bind(&state, &session, &guest, profile.as_ref());

    let member = wishlist.is_member(&query.product_id).await?;
    Ok(Json(ContainsResponse { member }))
}
