//! Commerce API gateway.
//!
//! One ingress for GraphQL operations from the storefront UI. Each operation
//! is routed to the Storefront API (catalog) or the Customer Account API
//! (identity) and sent with that endpoint's credentials only.
//!
//! # Response contract
//!
//! | Upstream outcome | Gateway result |
//! |---|---|
//! | JSON body, any status | status and body passed through unchanged |
//! | non-JSON body | [`GatewayError::NonJson`] (502) |
//! | connect failure or timeout | [`GatewayError::UpstreamUnreachable`] (503) |
//!
//! In development only, an unreachable identity endpoint yields a simulated
//! success marked with `extensions.simulated = true`.

mod classify;

pub use classify::{EndpointKind, classify, is_identity_field, root_fields};

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::config::{Environment, ShopifyConfig};
use crate::shopify::STOREFRONT_TOKEN_HEADER;

/// Header identifying this storefront to the Customer Account API.
pub const IDENTITY_CLIENT_HEADER: &str = "x-shopify-customer-account-client-id";

/// Errors that can occur while forwarding an operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The HTTP client could not be built.
    #[error("gateway client error: {0}")]
    Client(#[source] reqwest::Error),

    /// Upstream answered with something other than JSON.
    #[error("{kind} endpoint returned a non-JSON response (HTTP {status})")]
    NonJson {
        /// Endpoint that answered.
        kind: &'static str,
        /// Upstream status.
        status: StatusCode,
    },

    /// Upstream could not be reached or timed out.
    #[error("{kind} endpoint unreachable: {source}")]
    UpstreamUnreachable {
        /// Endpoint that failed.
        kind: &'static str,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
}

/// Inbound GraphQL operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Operation text.
    pub query: Option<String>,
    /// Operation variables.
    #[serde(default)]
    pub variables: Option<Value>,
    /// Explicit routing tag; wins over classification.
    #[serde(default)]
    pub endpoint_type: Option<EndpointKind>,
}

/// Upstream response passed back to the caller.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// Endpoint the operation went to.
    pub kind: EndpointKind,
    /// Upstream status.
    pub status: StatusCode,
    /// Upstream JSON body.
    pub body: Value,
}

/// Where and how an operation is sent.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    /// Selected endpoint.
    pub kind: EndpointKind,
    /// Upstream URL.
    pub url: String,
    /// Headers carrying this endpoint's credentials.
    pub headers: HeaderMap,
}

/// Upstream URLs and credentials.
#[derive(Debug, Clone)]
pub struct GatewayEndpoints {
    /// Storefront API GraphQL URL.
    pub catalog_url: String,
    /// Storefront API public token.
    pub catalog_token: String,
    /// Customer Account API GraphQL URL.
    pub identity_url: String,
    /// Customer Account API client ID.
    pub identity_client_id: String,
}

impl GatewayEndpoints {
    /// Endpoints for the configured shop.
    #[must_use]
    pub fn from_config(shopify: &ShopifyConfig) -> Self {
        Self {
            catalog_url: shopify.storefront_endpoint(),
            catalog_token: shopify.storefront_public_token.clone(),
            identity_url: shopify.customer_endpoint(),
            identity_client_id: shopify.customer_client_id.clone(),
        }
    }
}

/// Routes GraphQL operations to the catalog or identity endpoint.
#[derive(Clone)]
pub struct CommerceGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: reqwest::Client,
    endpoints: GatewayEndpoints,
    environment: Environment,
}

impl CommerceGateway {
    /// Create a gateway. Every upstream call is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoints: GatewayEndpoints,
        environment: Environment,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orchard-storefront/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                client,
                endpoints,
                environment,
            }),
        })
    }

    /// Build the URL and credential headers for an endpoint.
    ///
    /// Catalog requests carry only the storefront token. Identity requests
    /// carry only the client ID plus the caller's `Authorization`, verbatim.
    #[must_use]
    pub fn target(&self, kind: EndpointKind, authorization: Option<&HeaderValue>) -> UpstreamTarget {
        let endpoints = &self.inner.endpoints;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let url = match kind {
            EndpointKind::Catalog => {
                insert_credential(&mut headers, STOREFRONT_TOKEN_HEADER, &endpoints.catalog_token);
                endpoints.catalog_url.clone()
            }
            EndpointKind::Identity => {
                insert_credential(
                    &mut headers,
                    IDENTITY_CLIENT_HEADER,
                    &endpoints.identity_client_id,
                );
                if let Some(value) = authorization {
                    headers.insert(header::AUTHORIZATION, value.clone());
                }
                endpoints.identity_url.clone()
            }
        };

        UpstreamTarget { kind, url, headers }
    }

    /// Forward an operation upstream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NonJson`] or [`GatewayError::UpstreamUnreachable`];
    /// upstream HTTP errors with JSON bodies are returned as `Ok`.
    #[instrument(skip_all, fields(endpoint = tracing::field::Empty))]
    pub async fn forward(
        &self,
        query: &str,
        variables: Option<Value>,
        explicit: Option<EndpointKind>,
        authorization: Option<&HeaderValue>,
    ) -> Result<GatewayResponse, GatewayError> {
        let kind = classify(query, explicit);
        tracing::Span::current().record("endpoint", kind.as_str());

        let target = self.target(kind, authorization);
        let payload = json!({
            "query": query,
            "variables": variables.unwrap_or_else(|| Value::Object(Map::new())),
        });

        let sent = self
            .inner
            .client
            .post(&target.url)
            .headers(target.headers)
            .json(&payload)
            .send()
            .await;

        let outcome = match sent {
            Ok(response) => {
                let status = response.status();
                response.bytes().await.map(|body| (status, body))
            }
            Err(e) => Err(e),
        };

        let (status, bytes) = match outcome {
            Ok(received) => received,
            Err(source) => {
                warn!(error = %source, endpoint = kind.as_str(), "Upstream unreachable");
                if kind == EndpointKind::Identity && !self.inner.environment.is_production() {
                    warn!("Returning simulated identity response (development only)");
                    return Ok(simulated_identity_response(query));
                }
                return Err(GatewayError::UpstreamUnreachable {
                    kind: kind.as_str(),
                    source,
                });
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => Ok(GatewayResponse { kind, status, body }),
            Err(_) => {
                warn!(
                    %status,
                    endpoint = kind.as_str(),
                    body = %String::from_utf8_lossy(&bytes).chars().take(200).collect::<String>(),
                    "Upstream returned non-JSON; check shop and account identifiers"
                );
                Err(GatewayError::NonJson {
                    kind: kind.as_str(),
                    status,
                })
            }
        }
    }
}

fn insert_credential(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => warn!(header = name, "Credential is not a valid header value; omitted"),
    }
}

/// Success-shaped body for offline development of identity flows.
fn simulated_identity_response(query: &str) -> GatewayResponse {
    let data: Map<String, Value> = root_fields(query)
        .into_iter()
        .map(|field| (field, json!({ "userErrors": [] })))
        .collect();

    GatewayResponse {
        kind: EndpointKind::Identity,
        status: StatusCode::OK,
        body: json!({
            "data": data,
            "extensions": { "simulated": true },
        }),
    }
}
