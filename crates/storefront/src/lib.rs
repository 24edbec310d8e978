//! Orchard storefront library.
//!
//! Passwordless sign-in, the commerce GraphQL gateway, the cart, and the
//! wishlist, exposed as a library so they can be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod kv;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod shopify;
pub mod state;
