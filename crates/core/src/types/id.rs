//! Newtype IDs for type-safe entity references.
//!
//! The MarketPulse backend issues opaque string identifiers (document ids).
//! Use the `define_id!` macro to create wrappers that prevent accidentally
//! mixing IDs from different entity types.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`
/// - `Display`, `AsRef<str>`, `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use market_pulse_core::define_id;
/// define_id!(StallId);
/// define_id!(BasketId);
///
/// let stall = StallId::new("64f1c2");
/// let basket = BasketId::new("64f1c2");
///
/// // These are different types, so this won't compile:
/// // let _: StallId = basket;
/// assert_eq!(stall.as_str(), basket.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
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
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
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
    };
}

// Define standard entity IDs
define_id!(ProductId);
define_id!(AdvertisementId);
define_id!(CartLineId);
define_id!(WishlistItemId);
define_id!(OrderId);
define_id!(VendorApplicationId);
