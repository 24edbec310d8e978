//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Verification codes, session tokens, Customer Account OAuth
//! - `cart` - Cart state machine over the Storefront API
//! - `email` - Verification code delivery
//! - `login` - Work done once when a shopper signs in
//! - `wishlist` - Guest and profile wishlists, merged on login

pub mod auth;
pub mod cart;
pub mod email;
pub mod login;
pub mod wishlist;
