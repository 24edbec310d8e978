//! Integration tests for Orchard.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the storefront (in-memory KV, mock.shop catalog)
//! cargo run -p orchard-storefront
//!
//! # Run integration tests
//! cargo test -p orchard-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `storefront_auth` - Verification codes and the session endpoint
//! - `storefront_commerce` - Gateway, cart, and wishlist
//! - `storefront_ops` - Health checks and response headers

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

/// Base URL for the storefront (configurable via environment).
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A client that keeps cookies, like a browser tab.
///
/// Each client claims its own address through `x-real-ip`, so the per-IP
/// rate limiter treats concurrent tests as separate visitors.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn browser_client() -> Client {
    let [a, b, ..] = uuid::Uuid::new_v4().into_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-real-ip",
        HeaderValue::from_str(&format!("198.18.{a}.{b}")).expect("valid header value"),
    );

    Client::builder()
        .cookie_store(true)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// A unique address per test run so attempt caps never collide.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", uuid::Uuid::new_v4().simple())
}
