//! Login transition.
//!
//! Runs once per sign-in, after the session cookie is issued: the held cart
//! is re-associated with the buyer, then the guest wishlist is merged into
//! the profile. Neither step can undo the login; failures are logged.

use tracing::{info, warn};

use orchard_core::{Email, ProductId};

use crate::config::ShopifyConfig;
use crate::services::cart::{CartApi, CartIdStore, CartSession};
use crate::services::wishlist::{GuestWishlistStore, Wishlist, WishlistProfile};
use crate::shopify::Cart;

/// What the login transition produced.
#[derive(Debug, Default)]
pub struct LoginTransition {
    /// The held cart after association, if one is held and readable.
    pub cart: Option<Cart>,
    /// The merged wishlist, if the shopper has a profile wishlist.
    pub wishlist: Option<Vec<ProductId>>,
}

/// Associate the held cart, then merge the wishlist.
pub async fn complete_login<A, S, P, G>(
    carts: &CartSession<'_, A, S>,
    wishlist: Option<&Wishlist<'_, P, G>>,
) -> LoginTransition
where
    A: CartApi,
    S: CartIdStore,
    P: WishlistProfile,
    G: GuestWishlistStore,
{
    let cart = match carts.associate_identity().await {
        Ok(cart) => cart,
        Err(e) => {
            warn!(error = %e, "Cart association failed during login");
            None
        }
    };

    let wishlist = match wishlist {
        Some(wishlist) => match wishlist.on_login().await {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(error = %e, "Wishlist merge failed during login; guest copy kept");
                None
            }
        },
        None => None,
    };

    info!(
        cart = cart.is_some(),
        wishlist_count = wishlist.as_ref().map(Vec::len),
        "Login transition complete"
    );
    LoginTransition { cart, wishlist }
}

/// Where to send a shopper after a successful code login.
///
/// With Customer Accounts configured the shopper continues to Shopify's
/// login, pre-filled with their email, so carts and wishlists can be linked
/// to the account.
#[must_use]
pub fn post_verify_redirect(shopify: &ShopifyConfig, email: &Email) -> Option<String> {
    shopify.has_customer_accounts().then(|| {
        format!(
            "/auth/shopify/login?login_hint={}",
            urlencoding::encode(email.as_str())
        )
    })
}
