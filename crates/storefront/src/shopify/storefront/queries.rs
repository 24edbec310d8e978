//! GraphQL documents for the Shopify Storefront API.
//!
//! Every cart operation selects the same `CartFields` fragment so callers
//! always receive a full snapshot.

macro_rules! cart_fields {
    () => {
        r"
fragment MoneyFields on MoneyV2 {
  amount
  currencyCode
}

fragment CartFields on Cart {
  id
  checkoutUrl
  totalQuantity
  buyerIdentity {
    email
    customer {
      id
    }
  }
  cost {
    subtotalAmount { ...MoneyFields }
    totalAmount { ...MoneyFields }
    totalTaxAmount { ...MoneyFields }
  }
  deliveryGroups(first: 1) {
    nodes {
      selectedDeliveryOption {
        estimatedCost { ...MoneyFields }
      }
    }
  }
  lines(first: 100) {
    nodes {
      id
      quantity
      cost {
        amountPerQuantity { ...MoneyFields }
        totalAmount { ...MoneyFields }
      }
      merchandise {
        ... on ProductVariant {
          id
          title
          image { url altText width height }
          price { ...MoneyFields }
          product { id title handle }
        }
      }
    }
  }
}
"
    };
}

macro_rules! user_errors {
    () => {
        "userErrors { field message code }"
    };
}

pub const GET_CART: &str = concat!(
    r"
query GetCart($cartId: ID!) {
  cart(id: $cartId) { ...CartFields }
}
",
    cart_fields!()
);

pub const CREATE_CART: &str = concat!(
    r"
mutation CreateCart($input: CartInput!) {
  cartCreate(input: $input) {
    cart { ...CartFields }
    ",
    user_errors!(),
    r"
  }
}
",
    cart_fields!()
);

pub const ADD_CART_LINES: &str = concat!(
    r"
mutation AddCartLines($cartId: ID!, $lines: [CartLineInput!]!) {
  cartLinesAdd(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    ",
    user_errors!(),
    r"
  }
}
",
    cart_fields!()
);

pub const UPDATE_CART_LINES: &str = concat!(
    r"
mutation UpdateCartLines($cartId: ID!, $lines: [CartLineUpdateInput!]!) {
  cartLinesUpdate(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    ",
    user_errors!(),
    r"
  }
}
",
    cart_fields!()
);

pub const REMOVE_CART_LINES: &str = concat!(
    r"
mutation RemoveCartLines($cartId: ID!, $lineIds: [ID!]!) {
  cartLinesRemove(cartId: $cartId, lineIds: $lineIds) {
    cart { ...CartFields }
    ",
    user_errors!(),
    r"
  }
}
",
    cart_fields!()
);

pub const UPDATE_BUYER_IDENTITY: &str = concat!(
    r"
mutation UpdateCartBuyerIdentity($cartId: ID!, $buyerIdentity: CartBuyerIdentityInput!) {
  cartBuyerIdentityUpdate(cartId: $cartId, buyerIdentity: $buyerIdentity) {
    cart { ...CartFields }
    ",
    user_errors!(),
    r"
  }
}
",
    cart_fields!()
);

pub const PRODUCTS_BY_IDS: &str = r"
query ProductsByIds($ids: [ID!]!) {
  nodes(ids: $ids) {
    ... on Product {
      id
      title
      handle
      vendor
      featuredImage { url altText width height }
      priceRange {
        minVariantPrice { amount currencyCode }
        maxVariantPrice { amount currencyCode }
      }
    }
  }
}
";
