//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Chainmart ids are
//! opaque strings: order ids are time-derived, product ids come from the
//! catalog, and registration ids come from the registrar (or are synthesized
//! locally when it is unreachable).

use chrono::{DateTime, Utc};

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use chainmart_core::define_id;
/// define_id!(InvoiceId);
/// define_id!(ShipmentId);
///
/// let invoice = InvoiceId::new("INV-1");
/// let shipment = ShipmentId::new("SHP-1");
///
/// // These are different types, so this won't compile:
/// // let _: InvoiceId = shipment;
/// # let _ = (invoice, shipment);
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

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

define_id!(OrderId);
define_id!(ProductId);
define_id!(DomainId);
define_id!(DnsRecordId);
define_id!(RegistrationId);
define_id!(FulfillmentOrderId);

impl OrderId {
    /// Prefix shared by every order id.
    pub const PREFIX: &'static str = "ORD-";

    /// Derive an order id from the moment the order was created.
    ///
    /// Ids are human-readable (`ORD-1767225600000-00A3F1`) and sort by
    /// creation time. `suffix` keeps orders created in the same millisecond
    /// apart; only its low 24 bits are used.
    #[must_use]
    pub fn from_timestamp(at: DateTime<Utc>, suffix: u32) -> Self {
        Self(format!(
            "{}{}-{:06X}",
            Self::PREFIX,
            at.timestamp_millis(),
            suffix & 0x00FF_FFFF
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_order_id_is_time_derived() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let id = OrderId::from_timestamp(at, 0xA3F1);
        assert_eq!(id.as_str(), "ORD-1767225600000-00A3F1");
    }

    #[test]
    fn test_order_ids_in_same_millisecond_differ_by_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_ne!(OrderId::from_timestamp(at, 1), OrderId::from_timestamp(at, 2));
        assert_eq!(
            OrderId::from_timestamp(at, 0x1FF_FFFF).as_str(),
            "ORD-1767225600000-FFFFFF"
        );
    }

    #[test]
    fn test_order_ids_sort_by_time() {
        let earlier =
            OrderId::from_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(), 0xFF_FFFF);
        let later = OrderId::from_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap(), 0);
        assert!(earlier < later);
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let id = ProductId::new("tee-black-m");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tee-black-m\"");

        let parsed: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_display() {
        let id = RegistrationId::from("REG-42");
        assert_eq!(id.to_string(), "REG-42");
    }
}
