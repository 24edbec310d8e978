//! Newtype IDs for Shopify global identifiers.
//!
//! Shopify addresses every resource with an opaque global ID string such as
//! `gid://shopify/Product/7982904361` or
//! `gid://shopify/Cart/c1-8b2d...?key=4f1c`. Use the `define_gid!` macro to
//! create type-safe wrappers that prevent mixing IDs of different resources.

/// Prefix shared by all Shopify global IDs.
pub const GID_PREFIX: &str = "gid://shopify/";

/// Macro to define a type-safe Shopify global ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `new()`, `as_str()`, `into_inner()`, and `is_well_formed()` which checks
///   the `gid://shopify/<Kind>/<id>` shape for the resource kind
/// - `From<String>`, `From<&str>`, and `Display` implementations
///
/// IDs are deliberately not validated on construction: the upstream decides
/// what it can resolve, and callers keep identifiers they cannot resolve yet.
///
/// # Example
///
/// ```rust
/// # use orchard_core::define_gid;
/// define_gid!(OrderId, "Order");
///
/// let id = OrderId::new("gid://shopify/Order/42");
/// assert!(id.is_well_formed());
/// assert!(!OrderId::new("42").is_well_formed());
/// ```
#[macro_export]
macro_rules! define_gid {
    ($name:ident, $kind:literal) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Resource kind segment in the global ID.
            pub const KIND: &'static str = $kind;

            /// Wrap a raw identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the identifier.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the identifier has the `gid://shopify/<Kind>/<id>` shape.
            #[must_use]
            pub fn is_well_formed(&self) -> bool {
                self.0
                    .strip_prefix($crate::types::id::GID_PREFIX)
                    .and_then(|rest| rest.strip_prefix($kind))
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|rest| !rest.is_empty())
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_gid!(ProductId, "Product");
define_gid!(VariantId, "ProductVariant");
define_gid!(CartId, "Cart");
define_gid!(CartLineId, "CartLine");
define_gid!(CustomerId, "Customer");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_product_id() {
        assert!(ProductId::new("gid://shopify/Product/123").is_well_formed());
        assert!(!ProductId::new("gid://shopify/Product/").is_well_formed());
        assert!(!ProductId::new("gid://shopify/ProductVariant/1").is_well_formed());
        assert!(!ProductId::new("p1").is_well_formed());
    }

    #[test]
    fn test_cart_id_with_key_is_well_formed() {
        let id = CartId::new("gid://shopify/Cart/c1-abc?key=def");
        assert!(id.is_well_formed());
    }

    #[test]
    fn test_transparent_serde() {
        let id = VariantId::new("gid://shopify/ProductVariant/9");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gid://shopify/ProductVariant/9\"");
        let back: VariantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_display_and_ordering() {
        let a = ProductId::from("a");
        let b = ProductId::from("b");
        assert!(a < b);
        assert_eq!(a.to_string(), "a");
    }
}
