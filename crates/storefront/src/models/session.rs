//! Browser-session keys.
//!
//! The browser session (`tower-sessions`) is the durable client-side storage
//! for anonymous shoppers: it holds the cart identifier and the guest
//! wishlist, and the Customer Account token after an OAuth login.

/// Session keys.
pub mod keys {
    /// Key for storing the Shopify cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for the guest wishlist (JSON array of product IDs).
    pub const GUEST_WISHLIST: &str = "guest_wishlist";

    /// Key for the OAuth `state` of a login started in this browser.
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Key for Shopify customer access token.
    pub const SHOPIFY_CUSTOMER_TOKEN: &str = "shopify_customer_token";
}
