//! Shopify Storefront API client implementation.
//!
//! Requests go through `reqwest` 0.13 using the `graphql_client` request and
//! response envelopes. Wishlist product snapshots are cached with `moka`
//! (5-minute TTL); carts are never cached.

mod conversions;
mod queries;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use graphql_client::{QueryBody, Response};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use orchard_core::{CartId, CartLineId, ProductId};

use crate::config::ShopifyConfig;
use crate::shopify::types::{
    BuyerIdentity, Cart, CartLineInput, CartLineUpdateInput, WishlistProduct,
};
use crate::shopify::{GraphQLError, ShopifyError, convert_graphql_errors};

use conversions::{
    AddCartLinesData, CartMutationPayload, CreateCartData, GetCartData, ProductsByIdsData,
    RemoveCartLinesData, UpdateBuyerIdentityData, UpdateCartLinesData, convert_cart,
};

/// Storefront API header carrying the public access token.
pub const STOREFRONT_TOKEN_HEADER: &str = "x-shopify-storefront-access-token";

/// Maximum IDs accepted by a single `nodes(ids:)` query.
const NODES_PAGE_SIZE: usize = 250;

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    products: Cache<ProductId, WishlistProduct>,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    ///
    /// Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ShopifyConfig, timeout: Duration) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orchard-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let products = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300))
            .build();

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                endpoint: config.storefront_endpoint(),
                access_token: config.storefront_public_token.clone(),
                products,
            }),
        })
    }

    /// The GraphQL endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Execute a GraphQL document.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &'static str,
        operation_name: &'static str,
        variables: serde_json::Value,
    ) -> Result<T, ShopifyError> {
        let request_body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header(STOREFRONT_TOKEN_HEADER, &self.inner.access_token)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                operation = operation_name,
                body = %response_text.chars().take(500).collect::<String>(),
                "Shopify API returned non-success status"
            );
            return Err(ShopifyError::Status {
                status: status.as_u16(),
                body: response_text.chars().take(200).collect(),
            });
        }

        let response: Response<T> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    operation = operation_name,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse Shopify GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, operation = operation_name, "GraphQL errors in response");
            return Err(ShopifyError::GraphQL(convert_graphql_errors(errors)));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                operation = operation_name,
                "Shopify GraphQL response has no data and no errors"
            );
            ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// Create a new cart, optionally with initial lines and buyer identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or user errors are returned.
    #[instrument(skip(self, lines, buyer_identity), fields(lines = lines.len()))]
    pub async fn create_cart(
        &self,
        lines: Vec<CartLineInput>,
        buyer_identity: Option<&BuyerIdentity>,
    ) -> Result<Cart, ShopifyError> {
        let mut input = json!({ "lines": lines });
        if let Some(identity) = buyer_identity {
            input["buyerIdentity"] = serde_json::to_value(identity)?;
        }

        let data: CreateCartData = self
            .execute(queries::CREATE_CART, "CreateCart", json!({ "input": input }))
            .await?;

        into_cart(data.payload, "create cart")
    }

    /// Get a cart by ID. `Ok(None)` means Shopify no longer knows the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn get_cart(&self, cart_id: &CartId) -> Result<Option<Cart>, ShopifyError> {
        let result: Result<GetCartData, _> = self
            .execute(queries::GET_CART, "GetCart", json!({ "cartId": cart_id }))
            .await;

        match result {
            Ok(data) => Ok(data.cart.map(convert_cart)),
            // Malformed or foreign IDs are reported as GraphQL errors rather than null
            Err(ShopifyError::GraphQL(errors)) if errors.iter().any(is_invalid_id_error) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Add lines to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn add_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineInput>,
    ) -> Result<Cart, ShopifyError> {
        let data: AddCartLinesData = self
            .execute(
                queries::ADD_CART_LINES,
                "AddCartLines",
                json!({ "cartId": cart_id, "lines": lines }),
            )
            .await?;

        into_cart(data.payload, "add to cart")
    }

    /// Update cart line quantities.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn update_lines(
        &self,
        cart_id: &CartId,
        lines: Vec<CartLineUpdateInput>,
    ) -> Result<Cart, ShopifyError> {
        let data: UpdateCartLinesData = self
            .execute(
                queries::UPDATE_CART_LINES,
                "UpdateCartLines",
                json!({ "cartId": cart_id, "lines": lines }),
            )
            .await?;

        into_cart(data.payload, "update cart")
    }

    /// Remove lines from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id))]
    pub async fn remove_lines(
        &self,
        cart_id: &CartId,
        line_ids: Vec<CartLineId>,
    ) -> Result<Cart, ShopifyError> {
        let data: RemoveCartLinesData = self
            .execute(
                queries::REMOVE_CART_LINES,
                "RemoveCartLines",
                json!({ "cartId": cart_id, "lineIds": line_ids }),
            )
            .await?;

        into_cart(data.payload, "remove from cart")
    }

    /// Attach a buyer identity to an existing cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, buyer_identity), fields(cart_id = %cart_id))]
    pub async fn update_buyer_identity(
        &self,
        cart_id: &CartId,
        buyer_identity: &BuyerIdentity,
    ) -> Result<Cart, ShopifyError> {
        let data: UpdateBuyerIdentityData = self
            .execute(
                queries::UPDATE_BUYER_IDENTITY,
                "UpdateCartBuyerIdentity",
                json!({ "cartId": cart_id, "buyerIdentity": buyer_identity }),
            )
            .await?;

        into_cart(data.payload, "update buyer identity")
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Resolve product snapshots for a set of IDs, preserving input order.
    ///
    /// IDs that no longer resolve (deleted, unpublished, or not a product) are
    /// left out of the result. Resolved products are cached; misses are not.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<WishlistProduct>, ShopifyError> {
        let mut found: HashMap<ProductId, WishlistProduct> = HashMap::new();
        let mut missing: Vec<&ProductId> = Vec::new();

        for id in ids {
            if let Some(product) = self.inner.products.get(id).await {
                found.insert(id.clone(), product);
            } else if !missing.contains(&id) {
                missing.push(id);
            }
        }

        if !missing.is_empty() {
            debug!(
                cached = found.len(),
                fetching = missing.len(),
                "Resolving wishlist products"
            );
        }

        for chunk in missing.chunks(NODES_PAGE_SIZE) {
            let data: ProductsByIdsData = self
                .execute(
                    queries::PRODUCTS_BY_IDS,
                    "ProductsByIds",
                    json!({ "ids": chunk }),
                )
                .await?;

            for node in data.nodes.into_iter().flatten() {
                // Non-product nodes come back as `{}` and fail to parse
                if let Ok(product) = serde_json::from_value::<WishlistProduct>(node) {
                    self.inner
                        .products
                        .insert(product.id.clone(), product.clone())
                        .await;
                    found.insert(product.id.clone(), product);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

/// Unwrap a cart mutation payload.
///
/// User errors are failures even on HTTP 200. A user error on the cart ID maps
/// to [`ShopifyError::NotFound`]; anything else surfaces the first message.
fn into_cart(payload: Option<CartMutationPayload>, action: &str) -> Result<Cart, ShopifyError> {
    let Some(payload) = payload else {
        return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
            "Failed to {action}"
        ))]));
    };

    if payload.user_errors.iter().any(|e| e.is_cart_not_found()) {
        return Err(ShopifyError::NotFound("cart".to_string()));
    }

    if let Some(first) = payload.user_errors.into_iter().next() {
        return Err(ShopifyError::UserError(first.message));
    }

    payload.cart.map(convert_cart).ok_or_else(|| {
        ShopifyError::GraphQL(vec![GraphQLError::message(format!("Failed to {action}"))])
    })
}

fn is_invalid_id_error(error: &GraphQLError) -> bool {
    let message = error.message.to_ascii_lowercase();
    message.contains("invalid global id") || message.contains("invalid id")
}
