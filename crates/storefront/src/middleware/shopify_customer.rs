//! Customer Account token extractor.
//!
//! After an OAuth login the Customer Account access token lives in the
//! browser session. An expired token is refreshed once with its refresh
//! token; if that fails the token is dropped and the request proceeds as if
//! the shopper had no Customer Account link.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::models::keys;
use crate::shopify::{CustomerAccessToken, CustomerClient};

/// The live Customer Account token, if any.
pub struct OptionalShopifyCustomer(pub Option<CustomerAccessToken>);

impl<S> FromRequestParts<S> for OptionalShopifyCustomer
where
    CustomerClient: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self(None));
        };
        let token = session
            .get::<CustomerAccessToken>(keys::SHOPIFY_CUSTOMER_TOKEN)
            .await
            .ok()
            .flatten();

        let token = match token {
            Some(token) if token.is_expired() => {
                refresh(&CustomerClient::from_ref(state), session, token).await
            }
            other => other,
        };
        Ok(Self(token))
    }
}

async fn refresh(
    client: &CustomerClient,
    session: &Session,
    expired: CustomerAccessToken,
) -> Option<CustomerAccessToken> {
    let refreshed = match expired.refresh_token.as_deref() {
        Some(refresh_token) => client.refresh_token(refresh_token).await,
        None => {
            debug!("Customer token expired without a refresh token");
            let _ = clear_shopify_customer_token(session).await;
            return None;
        }
    };

    match refreshed {
        Ok(mut token) => {
            if token.id_token.is_none() {
                token.id_token = expired.id_token;
            }
            if token.refresh_token.is_none() {
                token.refresh_token = expired.refresh_token;
            }
            if let Err(e) = set_shopify_customer_token(session, &token).await {
                warn!(error = %e, "Failed to store refreshed customer token");
            }
            debug!("Customer token refreshed");
            Some(token)
        }
        Err(e) => {
            warn!(error = %e, "Customer token refresh failed; dropping token");
            let _ = clear_shopify_customer_token(session).await;
            None
        }
    }
}

/// Store the Customer Account token in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_shopify_customer_token(
    session: &Session,
    token: &CustomerAccessToken,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::SHOPIFY_CUSTOMER_TOKEN, token).await
}

/// Remove the Customer Account token from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_shopify_customer_token(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CustomerAccessToken>(keys::SHOPIFY_CUSTOMER_TOKEN)
        .await?;
    Ok(())
}
