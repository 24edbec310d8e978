//! Raw Storefront API response shapes and their conversion to domain types.

use serde::Deserialize;

use orchard_core::{CartId, CartLineId, Money, ProductId, VariantId};

use crate::shopify::types::{
    Cart, CartBuyerIdentity, CartCost, CartLine, CartLineCost, CartMerchandise, CartUserError,
    Image,
};

#[derive(Debug, Deserialize)]
pub(super) struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GetCartData {
    pub cart: Option<CartNode>,
}

/// Payload shared by every cart mutation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CartMutationPayload {
    pub cart: Option<CartNode>,
    #[serde(default)]
    pub user_errors: Vec<CartUserError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCartData {
    #[serde(rename = "cartCreate")]
    pub payload: Option<CartMutationPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AddCartLinesData {
    #[serde(rename = "cartLinesAdd")]
    pub payload: Option<CartMutationPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateCartLinesData {
    #[serde(rename = "cartLinesUpdate")]
    pub payload: Option<CartMutationPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RemoveCartLinesData {
    #[serde(rename = "cartLinesRemove")]
    pub payload: Option<CartMutationPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateBuyerIdentityData {
    #[serde(rename = "cartBuyerIdentityUpdate")]
    pub payload: Option<CartMutationPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductsByIdsData {
    #[serde(default)]
    pub nodes: Vec<Option<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CartNode {
    id: CartId,
    checkout_url: String,
    total_quantity: i64,
    buyer_identity: Option<BuyerIdentityNode>,
    cost: CartCostNode,
    delivery_groups: Option<Nodes<DeliveryGroupNode>>,
    lines: Nodes<CartLineNode>,
}

#[derive(Debug, Deserialize)]
struct BuyerIdentityNode {
    email: Option<String>,
    customer: Option<CustomerRef>,
}

#[derive(Debug, Deserialize)]
struct CustomerRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCostNode {
    subtotal_amount: Money,
    total_amount: Money,
    total_tax_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryGroupNode {
    selected_delivery_option: Option<DeliveryOptionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryOptionNode {
    estimated_cost: Money,
}

#[derive(Debug, Deserialize)]
struct CartLineNode {
    id: CartLineId,
    quantity: i64,
    cost: CartLineCost,
    merchandise: MerchandiseNode,
}

#[derive(Debug, Deserialize)]
struct MerchandiseNode {
    id: VariantId,
    title: String,
    image: Option<Image>,
    price: Money,
    product: ProductRef,
}

#[derive(Debug, Deserialize)]
struct ProductRef {
    id: ProductId,
    title: String,
    handle: String,
}

/// Convert a raw cart into the domain cart.
pub(super) fn convert_cart(node: CartNode) -> Cart {
    let shipping_amount = node
        .delivery_groups
        .and_then(|groups| groups.nodes.into_iter().next())
        .and_then(|group| group.selected_delivery_option)
        .map(|option| option.estimated_cost);

    Cart {
        id: node.id,
        checkout_url: node.checkout_url,
        total_quantity: node.total_quantity,
        lines: node.lines.nodes.into_iter().map(convert_line).collect(),
        cost: CartCost {
            subtotal_amount: node.cost.subtotal_amount,
            total_amount: node.cost.total_amount,
            total_tax_amount: node.cost.total_tax_amount,
            shipping_amount,
        },
        buyer_identity: node.buyer_identity.map(|b| CartBuyerIdentity {
            email: b.email,
            customer_id: b.customer.map(|c| c.id),
        }),
    }
}

fn convert_line(node: CartLineNode) -> CartLine {
    CartLine {
        id: node.id,
        quantity: node.quantity,
        cost: node.cost,
        merchandise: CartMerchandise {
            id: node.merchandise.id,
            title: node.merchandise.title,
            product_id: node.merchandise.product.id,
            product_title: node.merchandise.product.title,
            product_handle: node.merchandise.product.handle,
            image: node.merchandise.image,
            price: node.merchandise.price,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    fn money(amount: &str) -> serde_json::Value {
        json!({ "amount": amount, "currencyCode": "USD" })
    }

    #[test]
    fn test_convert_cart_snapshot() {
        let raw = json!({
            "id": "gid://shopify/Cart/c1?key=abc",
            "checkoutUrl": "https://shop.example/cart/c/c1",
            "totalQuantity": 3,
            "buyerIdentity": { "email": null, "customer": null },
            "cost": {
                "subtotalAmount": money("30.0"),
                "totalAmount": money("32.5"),
                "totalTaxAmount": null
            },
            "deliveryGroups": { "nodes": [
                { "selectedDeliveryOption": { "estimatedCost": money("2.5") } }
            ] },
            "lines": { "nodes": [{
                "id": "gid://shopify/CartLine/1",
                "quantity": 3,
                "cost": {
                    "amountPerQuantity": money("10.0"),
                    "totalAmount": money("30.0")
                },
                "merchandise": {
                    "id": "gid://shopify/ProductVariant/11",
                    "title": "Default Title",
                    "image": null,
                    "price": money("10.0"),
                    "product": {
                        "id": "gid://shopify/Product/1",
                        "title": "Hat",
                        "handle": "hat"
                    }
                }
            }] }
        });

        let node: CartNode = serde_json::from_value(raw).unwrap();
        let cart = convert_cart(node);

        assert_eq!(cart.id.as_str(), "gid://shopify/Cart/c1?key=abc");
        assert_eq!(cart.total_quantity, 3);
        assert_eq!(cart.lines.len(), 1);
        let line = cart.lines.first().unwrap();
        assert_eq!(line.merchandise.product_handle, "hat");
        assert_eq!(line.cost.total_amount.amount, Decimal::new(300, 1));
        assert_eq!(
            cart.cost.shipping_amount.unwrap().amount,
            Decimal::new(25, 1)
        );
        assert!(cart.cost.total_tax_amount.is_none());
    }

    #[test]
    fn test_mutation_payload_without_cart() {
        let raw = json!({
            "cartLinesAdd": {
                "cart": null,
                "userErrors": [{
                    "field": ["cartId"],
                    "message": "The specified cart does not exist.",
                    "code": "INVALID"
                }]
            }
        });
        let data: AddCartLinesData = serde_json::from_value(raw).unwrap();
        let payload = data.payload.unwrap();
        assert!(payload.cart.is_none());
        assert!(payload.user_errors.first().unwrap().is_cart_not_found());
    }
}
