//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (KV round trip)
//!
//! # Auth (rate limited per IP)
//! POST /auth/send-code         - Email a verification code
//! POST /auth/verify-code       - Exchange a code for the session cookie
//! POST /auth/logout            - Clear the session cookie
//! GET  /auth/session           - Current identity
//! GET  /auth/code-status       - Resend cooldown
//!
//! # Shopify Customer OAuth
//! GET  /auth/shopify/login     - Redirect to Shopify OAuth
//! GET  /auth/shopify/callback  - Handle OAuth callback
//!
//! # Commerce
//! POST /commerce/graphql       - GraphQL gateway
//! GET  /cart                   - Held cart
//! POST /cart                   - Cart mutation (`action` discriminator)
//! GET  /wishlist               - Wishlist with product snapshots
//! POST /wishlist/toggle        - Add or remove a product
//! GET  /wishlist/contains      - Membership check
//! ```

pub mod auth;
pub mod cart;
pub mod commerce;
pub mod health;
pub mod shopify_auth;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/send-code", post(auth::send_code))
        .route("/verify-code", post(auth::verify_code))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .route("/code-status", get(auth::code_status))
        // Shopify Customer Account OAuth
        .route("/shopify/login", get(shopify_auth::login))
        .route("/shopify/callback", get(shopify_auth::callback))
}

/// Create the commerce routes router.
pub fn commerce_routes() -> Router<AppState> {
    Router::new()
        .route("/commerce/graphql", post(commerce::graphql))
        .route("/cart", get(cart::show).post(cart::mutate))
        .route("/wishlist", get(wishlist::show))
        .route("/wishlist/toggle", post(wishlist::toggle))
        .route("/wishlist/contains", get(wishlist::contains))
}

/// Create the health routes router.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health_routes())
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
        .merge(commerce_routes().layer(api_rate_limiter()))
}
