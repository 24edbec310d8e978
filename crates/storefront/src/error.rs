//! Unified error handling with Sentry integration.
//!
//! Every component error converts into [`AppError`], which picks the status
//! code and the message the shopper sees. Server-side failures are captured
//! to Sentry and logged; their details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::kv::KvError;
use crate::services::auth::{AuthError, CodeError};
use crate::services::cart::CartError;
use crate::services::wishlist::WishlistError;
use crate::shopify::ShopifyError;

const UNREACHABLE_MESSAGE: &str = "We couldn't reach the store. Please try again.";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Sign-in failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Wishlist operation failed.
    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    /// GraphQL gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Shopify API operation failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] ShopifyError),

    /// KV store failed.
    #[error("KV error: {0}")]
    Kv(#[from] KvError),

    /// Browser session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CodeError> for AppError {
    fn from(err: CodeError) -> Self {
        Self::Auth(AuthError::Code(err))
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_)
                | AuthError::InvalidCode(_)
                | AuthError::InvalidOAuthState
                | AuthError::OAuthDenied(_) => StatusCode::BAD_REQUEST,
                AuthError::Code(code) => match code {
                    CodeError::CodeNotFound | CodeError::CodeExpired | CodeError::CodeMismatch => {
                        StatusCode::BAD_REQUEST
                    }
                    CodeError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
                    CodeError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                },
                AuthError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Shopify(e) => shopify_status(e),
                AuthError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CartError::Expired => StatusCode::CONFLICT,
                CartError::NoCart => StatusCode::NOT_FOUND,
                CartError::InvalidQuantity => StatusCode::BAD_REQUEST,
                CartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CartError::Upstream(e) => shopify_status(e),
            },
            Self::Wishlist(err) => match err {
                WishlistError::Upstream(e) => shopify_status(e),
                WishlistError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                WishlistError::Corrupt(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Gateway(err) => match err {
                GatewayError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
                GatewayError::NonJson { .. } => StatusCode::BAD_GATEWAY,
                GatewayError::UpstreamUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Shopify(e) => shopify_status(e),
            Self::Kv(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => "Please enter a valid email address.".to_string(),
                AuthError::InvalidCode(_) => "Please enter the 6-digit code.".to_string(),
                AuthError::Code(code) => code.user_message().to_string(),
                AuthError::InvalidOAuthState => {
                    "Your sign-in link has expired. Please try again.".to_string()
                }
                AuthError::OAuthDenied(_) => "Sign-in was cancelled.".to_string(),
                AuthError::Storage(_) => {
                    "We couldn't reach the verification service. Please try again.".to_string()
                }
                AuthError::Shopify(e) => shopify_message(e),
                AuthError::Token(_) => "Internal server error".to_string(),
            },
            Self::Cart(err) => match err {
                CartError::Rejected(message) => message.clone(),
                CartError::Expired => {
                    "Your cart has expired. Please add the item again.".to_string()
                }
                CartError::NoCart => "You don't have a cart yet.".to_string(),
                CartError::InvalidQuantity => "Quantity must be at least 1.".to_string(),
                CartError::Storage(_) => "Internal server error".to_string(),
                CartError::Upstream(e) => shopify_message(e),
            },
            Self::Wishlist(err) => match err {
                WishlistError::Upstream(e) => shopify_message(e),
                WishlistError::Storage(_) => "Internal server error".to_string(),
                WishlistError::Corrupt(_) => {
                    "Your saved wishlist could not be read.".to_string()
                }
            },
            Self::Gateway(err) => match err {
                GatewayError::Client(_) => "Internal server error".to_string(),
                GatewayError::NonJson { kind, .. } => format!(
                    "The {kind} API returned a non-JSON response. Check the shop domain and account identifiers."
                ),
                GatewayError::UpstreamUnreachable { .. } => UNREACHABLE_MESSAGE.to_string(),
            },
            Self::Shopify(e) => shopify_message(e),
            Self::Kv(_) => "Storage is unavailable.".to_string(),
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::Unauthorized(message) | Self::BadRequest(message) => message.clone(),
        }
    }
}

fn shopify_status(err: &ShopifyError) -> StatusCode {
    match err {
        ShopifyError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ShopifyError::UserError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ShopifyError::NotFound(_) => StatusCode::NOT_FOUND,
        ShopifyError::OAuth(_) => StatusCode::BAD_REQUEST,
        e if e.is_transport() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn shopify_message(err: &ShopifyError) -> String {
    match err {
        ShopifyError::RateLimited(_) => "The store is busy. Please try again shortly.".to_string(),
        ShopifyError::UserError(message) => message.clone(),
        ShopifyError::NotFound(what) => format!("Not found: {what}"),
        ShopifyError::OAuth(_) => "Sign-in with your store account failed.".to_string(),
        e if e.is_transport() => UNREACHABLE_MESSAGE.to_string(),
        _ => "Something went wrong talking to the store.".to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// `id` is a customer ID or an email hash, never a raw address.
pub fn set_sentry_user(id: String) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(id),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("variant_id", "gid://shopify/ProductVariant/1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
