//! Shopify Customer Account API client.
//!
//! The Customer Account API provides customer authentication and profile
//! access. Authentication is OAuth 2.0 with PKCE as a public client: no client
//! secret is held by this server.
//!
//! # OAuth Flow
//!
//! 1. Generate a [`PkceChallenge`], `state`, and `nonce`
//! 2. Redirect the customer to [`CustomerClient::authorization_url`]
//! 3. Shopify redirects back with an authorization code
//! 4. Exchange it with [`CustomerClient::exchange_code`] and the verifier
//! 5. Use the access token for customer-scoped API calls

mod pkce;
mod types;

pub use pkce::{PkceChallenge, random_token};
pub use types::{CustomerAccessToken, CustomerIdentity, MetafieldUserError, WishlistMetafield};

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{QueryBody, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use orchard_core::CustomerId;

use crate::config::ShopifyConfig;
use crate::shopify::{ShopifyError, convert_graphql_errors};

use types::{CustomerData, MetafieldsSetData, TokenResponse, WishlistData};

/// Metafield namespace holding the wishlist.
pub const WISHLIST_NAMESPACE: &str = "custom";
/// Metafield key holding the wishlist.
pub const WISHLIST_KEY: &str = "wishlist";

const OAUTH_SCOPE: &str = "openid email customer-account-api:full";

// ─────────────────────────────────────────────────────────────────────────────
// Customer Account Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Shopify Customer Account API.
#[derive(Clone)]
pub struct CustomerClient {
    inner: Arc<CustomerClientInner>,
}

struct CustomerClientInner {
    client: reqwest::Client,
    auth_base: String,
    endpoint: String,
    client_id: String,
}

impl CustomerClient {
    /// Create a new Customer Account API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ShopifyConfig, timeout: Duration) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orchard-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(CustomerClientInner {
                client,
                auth_base: config.customer_auth_base(),
                endpoint: config.customer_endpoint(),
                client_id: config.customer_client_id.clone(),
            }),
        })
    }

    /// Get the OAuth client ID (safe to expose in frontend).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // OAuth Flow
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate the authorization URL for customer login.
    ///
    /// `login_hint` pre-fills the email on Shopify's login page.
    #[must_use]
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
        pkce: &PkceChallenge,
        login_hint: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{}/authorize?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope={}&\
            state={}&\
            nonce={}&\
            code_challenge={}&\
            code_challenge_method=S256",
            self.inner.auth_base,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(OAUTH_SCOPE),
            urlencoding::encode(state),
            urlencoding::encode(nonce),
            urlencoding::encode(pkce.challenge()),
        );

        if let Some(hint) = login_hint {
            url.push_str("&login_hint=");
            url.push_str(&urlencoding::encode(hint));
        }

        url
    }

    /// Generate the logout URL.
    #[must_use]
    pub fn logout_url(&self, id_token: &str, post_logout_redirect_uri: &str) -> String {
        format!(
            "{}/logout?id_token_hint={}&post_logout_redirect_uri={}",
            self.inner.auth_base,
            urlencoding::encode(id_token),
            urlencoding::encode(post_logout_redirect_uri)
        )
    }

    /// Exchange an authorization code for access tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<CustomerAccessToken, ShopifyError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
            ("code_verifier", code_verifier),
        ];

        self.token_request(&params, "Token exchange failed").await
    }

    /// Refresh an access token using a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token refresh fails.
    #[instrument(skip_all)]
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<CustomerAccessToken, ShopifyError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.inner.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        self.token_request(&params, "Token refresh failed").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        failure: &str,
    ) -> Result<CustomerAccessToken, ShopifyError> {
        let url = format!("{}/token", self.inner.auth_base);
        let response = self.inner.client.post(&url).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %text.chars().take(200).collect::<String>(), "{failure}");
            return Err(ShopifyError::OAuth(format!("{failure} ({status})")));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response.into_token())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // GraphQL Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute a GraphQL document against the Customer Account API.
    async fn query<T: DeserializeOwned>(
        &self,
        access_token: &str,
        query: &'static str,
        operation_name: &'static str,
        variables: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("Authorization", access_token)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ShopifyError::OAuth(format!(
                "Customer API request failed ({status}): {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let response: Response<T> = response.json().await?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            return Err(ShopifyError::GraphQL(convert_graphql_errors(errors)));
        }

        response
            .data
            .ok_or_else(|| ShopifyError::OAuth("No data in response".to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Customer Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the signed-in customer's ID and email.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip_all)]
    pub async fn get_customer(&self, access_token: &str) -> Result<CustomerIdentity, ShopifyError> {
        const QUERY: &str = r"
            query GetCustomer {
                customer {
                    id
                    emailAddress {
                        emailAddress
                    }
                }
            }
        ";

        let data: CustomerData = self
            .query(access_token, QUERY, "GetCustomer", json!({}))
            .await?;

        Ok(CustomerIdentity {
            id: data.customer.id,
            email: data.customer.email_address.and_then(|e| e.email_address),
        })
    }

    /// Read the customer's wishlist metafield.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip_all)]
    pub async fn get_wishlist(&self, access_token: &str) -> Result<WishlistMetafield, ShopifyError> {
        const QUERY: &str = r"
            query GetWishlist($namespace: String!, $key: String!) {
                customer {
                    id
                    metafield(namespace: $namespace, key: $key) {
                        value
                    }
                }
            }
        ";

        let data: WishlistData = self
            .query(
                access_token,
                QUERY,
                "GetWishlist",
                json!({ "namespace": WISHLIST_NAMESPACE, "key": WISHLIST_KEY }),
            )
            .await?;

        Ok(WishlistMetafield {
            customer_id: data.customer.id,
            value: data.customer.metafield.map(|m| m.value),
        })
    }

    /// Overwrite the customer's wishlist metafield with a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or user errors are returned.
    #[instrument(skip(self, access_token, value), fields(customer_id = %customer_id))]
    pub async fn set_wishlist(
        &self,
        access_token: &str,
        customer_id: &CustomerId,
        value: &str,
    ) -> Result<(), ShopifyError> {
        const QUERY: &str = r"
            mutation SetWishlist($metafields: [MetafieldsSetInput!]!) {
                metafieldsSet(metafields: $metafields) {
                    metafields {
                        key
                    }
                    userErrors {
                        field
                        message
                        code
                    }
                }
            }
        ";

        let variables = json!({
            "metafields": [{
                "ownerId": customer_id,
                "namespace": WISHLIST_NAMESPACE,
                "key": WISHLIST_KEY,
                "type": "json",
                "value": value,
            }]
        });

        let data: MetafieldsSetData = self
            .query(access_token, QUERY, "SetWishlist", variables)
            .await?;

        let payload = data
            .payload
            .ok_or_else(|| ShopifyError::OAuth("No metafieldsSet payload".to_string()))?;

        if !payload.user_errors.is_empty() {
            let messages: Vec<_> = payload
                .user_errors
                .iter()
                .map(|e| e.message.as_str())
                .collect();
            return Err(ShopifyError::UserError(messages.join(", ")));
        }

        Ok(())
    }
}
