//! Domain types for the Shopify Storefront API.
//!
//! These are the shapes handed to routes and services. Raw GraphQL response
//! shapes live next to the queries and are converted into these.

use serde::{Deserialize, Serialize};

use orchard_core::{CartId, CartLineId, Money, ProductId, VariantId};

// =============================================================================
// Shared Types
// =============================================================================

/// Product or variant image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image URL.
    pub url: String,
    /// Alt text.
    pub alt_text: Option<String>,
    /// Width in pixels.
    pub width: Option<i64>,
    /// Height in pixels.
    pub height: Option<i64>,
}

/// Price range for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    /// Minimum price among all variants.
    pub min_variant_price: Money,
    /// Maximum price among all variants.
    pub max_variant_price: Money,
}

// =============================================================================
// Cart Types
// =============================================================================

/// Product variant referenced by a cart line, as of the last fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    /// Variant ID.
    pub id: VariantId,
    /// Variant title (e.g., "Large / Red").
    pub title: String,
    /// Owning product ID.
    pub product_id: ProductId,
    /// Owning product title.
    pub product_title: String,
    /// Owning product handle.
    pub product_handle: String,
    /// Variant image, falling back to none.
    pub image: Option<Image>,
    /// Current unit price.
    pub price: Money,
}

/// Cost of one cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCost {
    /// Price per unit.
    pub amount_per_quantity: Money,
    /// Line total after line-level discounts.
    pub total_amount: Money,
}

/// A line in the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Line ID.
    pub id: CartLineId,
    /// Quantity, always at least 1.
    pub quantity: i64,
    /// Line cost.
    pub cost: CartLineCost,
    /// Merchandise snapshot.
    pub merchandise: CartMerchandise,
}

/// Aggregate cart cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    /// Subtotal before taxes and shipping.
    pub subtotal_amount: Money,
    /// Total amount.
    pub total_amount: Money,
    /// Total tax, once estimated.
    pub total_tax_amount: Option<Money>,
    /// Selected shipping rate, once a delivery option is chosen.
    pub shipping_amount: Option<Money>,
}

/// Buyer identity attached to a cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBuyerIdentity {
    /// Buyer email.
    pub email: Option<String>,
    /// Customer ID when linked to an account.
    pub customer_id: Option<String>,
}

/// Full cart snapshot. Every mutation returns one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Checkout URL.
    pub checkout_url: String,
    /// Total item quantity.
    pub total_quantity: i64,
    /// Cart lines, in upstream order.
    pub lines: Vec<CartLine>,
    /// Cart cost summary.
    pub cost: CartCost,
    /// Buyer identity.
    pub buyer_identity: Option<CartBuyerIdentity>,
}

/// Input for adding a line to a cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    /// Product variant ID.
    pub merchandise_id: VariantId,
    /// Quantity to add.
    pub quantity: i64,
}

/// Input for changing the quantity of a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineUpdateInput {
    /// Cart line ID.
    pub id: CartLineId,
    /// New quantity.
    pub quantity: i64,
}

/// Buyer identity sent with `cartCreate` and `cartBuyerIdentityUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerIdentity {
    /// Buyer email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Customer access token linking the cart to an account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_access_token: Option<String>,
}

/// User error returned by a cart mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartUserError {
    /// Input field path.
    pub field: Option<Vec<String>>,
    /// Error message.
    pub message: String,
    /// Machine-readable code (e.g., `INVALID`, `NOT_FOUND`).
    pub code: Option<String>,
}

impl CartUserError {
    /// Whether the error means the cart ID no longer resolves.
    #[must_use]
    pub fn is_cart_not_found(&self) -> bool {
        let on_cart_id = self
            .field
            .as_ref()
            .is_some_and(|f| f.iter().any(|seg| seg == "cartId"));
        let code_not_found = self
            .code
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("NOT_FOUND"));
        let message = self.message.to_ascii_lowercase();

        (on_cart_id && (code_not_found || message.contains("does not exist")))
            || message.contains("cart not found")
            || message.contains("the specified cart does not exist")
    }
}

// =============================================================================
// Wishlist Types
// =============================================================================

/// Product snapshot shown in a wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistProduct {
    /// Product ID.
    pub id: ProductId,
    /// Product title.
    pub title: String,
    /// URL handle.
    pub handle: String,
    /// Vendor name.
    pub vendor: String,
    /// Featured image.
    pub featured_image: Option<Image>,
    /// Price range.
    pub price_range: PriceRange,
}
