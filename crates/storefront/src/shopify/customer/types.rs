//! Types for Shopify Customer Account API OAuth and responses.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use orchard_core::CustomerId;

// ─────────────────────────────────────────────────────────────────────────────
// OAuth Types
// ─────────────────────────────────────────────────────────────────────────────

/// Customer access token obtained via OAuth.
///
/// Stored in the server-side browser session, never sent to the browser.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomerAccessToken {
    /// The access token for API requests.
    pub access_token: String,
    /// The ID token (`OpenID` Connect).
    pub id_token: Option<String>,
    /// The refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Unix timestamp when the token was obtained.
    pub obtained_at: i64,
}

impl CustomerAccessToken {
    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Check expiry against a given Unix timestamp.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_in.is_some_and(|expires_in| {
            let expires_at = self.obtained_at + expires_in;
            now >= (expires_at - 60)
        })
    }
}

impl std::fmt::Debug for CustomerAccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerAccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish_non_exhaustive()
    }
}

/// Raw token response from Shopify OAuth endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub(super) fn into_token(self) -> CustomerAccessToken {
        CustomerAccessToken {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_in: self.expires_in,
            obtained_at: Utc::now().timestamp(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Customer Types
// ─────────────────────────────────────────────────────────────────────────────

/// The signed-in customer's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerIdentity {
    /// Customer global ID.
    pub id: CustomerId,
    /// Primary email address, if the account has one.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CustomerNode {
    pub id: CustomerId,
    pub email_address: Option<EmailAddressNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EmailAddressNode {
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CustomerData {
    pub customer: CustomerNode,
}

/// Customer ID and the raw wishlist metafield value.
#[derive(Debug, Clone)]
pub struct WishlistMetafield {
    /// Owner of the metafield.
    pub customer_id: CustomerId,
    /// JSON array of product IDs, absent until first written.
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WishlistData {
    pub customer: WishlistCustomerNode,
}

#[derive(Debug, Deserialize)]
pub(super) struct WishlistCustomerNode {
    pub id: CustomerId,
    pub metafield: Option<MetafieldNode>,
}

#[derive(Debug, Deserialize)]
pub(super) struct MetafieldNode {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct MetafieldsSetData {
    #[serde(rename = "metafieldsSet")]
    pub payload: Option<MetafieldsSetPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MetafieldsSetPayload {
    #[serde(default)]
    pub user_errors: Vec<MetafieldUserError>,
}

/// User error from a metafield mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct MetafieldUserError {
    /// Input field path.
    pub field: Option<Vec<String>>,
    /// Error message.
    pub message: String,
    /// Machine-readable code.
    pub code: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token(expires_in: Option<i64>) -> CustomerAccessToken {
        CustomerAccessToken {
            access_token: "shcat_secret".to_string(),
            id_token: None,
            refresh_token: None,
            expires_in,
            obtained_at: 1_000,
        }
    }

    #[test]
    fn test_token_expiry_buffer() {
        let t = token(Some(3600));
        assert!(!t.is_expired_at(1_000 + 3_539));
        assert!(t.is_expired_at(1_000 + 3_540));
        assert!(!token(None).is_expired_at(i64::MAX));
    }

    #[test]
    fn test_token_debug_redacted() {
        assert!(!format!("{:?}", token(None)).contains("shcat_secret"));
    }

    #[test]
    fn test_customer_node_parses() {
        let data: CustomerData = serde_json::from_value(serde_json::json!({
            "customer": {
                "id": "gid://shopify/Customer/7",
                "emailAddress": { "emailAddress": "a@b.com" }
            }
        }))
        .unwrap();
        assert_eq!(data.customer.id.as_str(), "gid://shopify/Customer/7");
        assert_eq!(
            data.customer.email_address.unwrap().email_address.as_deref(),
            Some("a@b.com")
        );
    }
}
