//! Completed purchase records.
//!
//! An [`Order`] is written exactly once per confirmed payment. Its item list
//! is a copy of the cart at checkout time, so later cart changes never reach
//! it. The only permitted mutation is the status transition enforced by
//! [`Order::transition_to`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::cart::CartItem;
use crate::types::{
    Currency, Email, FulfillmentOrderId, OrderId, OrderKind, OrderStatus, Provenance,
    RegistrationId, TxHash, WalletAddress,
};

/// Errors raised by order state changes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The requested status change is not allowed.
    #[error("order {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Shipping details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub full_name: String,
    pub email: Email,
    pub phone: String,
    pub address: String,
    pub city: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: Option<String>,
    pub zip: String,
}

/// Registrar outcome attached to a domain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: RegistrationId,
    /// `Synthesized` when the registrar was unreachable and the id was
    /// generated locally; such orders still need upstream verification.
    pub provenance: Provenance,
}

/// A completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub kind: OrderKind,
    pub buyer: WalletAddress,
    pub total: Decimal,
    pub currency: Currency,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub tx_hash: TxHash,
    pub status: OrderStatus,
    pub shipping: Option<ShippingInfo>,
    pub invoice_number: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub domain: Option<String>,
    pub registration: Option<RegistrationRecord>,
    pub fulfillment_order_id: Option<FulfillmentOrderId>,
}

impl Order {
    /// Build the invoice number for an order created at `at`.
    ///
    /// Format: `INV-<YYYYMMDD>-<suffix>` where `suffix` is caller-supplied
    /// entropy rendered as six uppercase hex digits.
    #[must_use]
    pub fn invoice_number(at: DateTime<Utc>, suffix: u32) -> String {
        format!("INV-{}-{:06X}", at.format("%Y%m%d"), suffix & 0x00FF_FFFF)
    }

    /// Move the order to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] unless the order is
    /// `Processing` and `next` is `Confirmed` or `Failed`.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Whether the registration behind this order still needs upstream
    /// verification.
    #[must_use]
    pub fn needs_registration_verification(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|registration| registration.provenance.is_synthesized())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn order() -> Order {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap();
        Order {
            id: OrderId::from_timestamp(at, 0x123),
            kind: OrderKind::Domain,
            buyer: WalletAddress::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap(),
            total: Decimal::new(3999, 2),
            currency: Currency::Usdt,
            items: Vec::new(),
            created_at: at,
            tx_hash: TxHash::parse(&format!("0x{}", "1".repeat(64))).unwrap(),
            status: OrderStatus::Processing,
            shipping: None,
            invoice_number: Order::invoice_number(at, 0xABC),
            estimated_delivery: None,
            domain: Some("example.io".to_owned()),
            registration: Some(RegistrationRecord {
                id: RegistrationId::new("LOCAL-1"),
                provenance: Provenance::Synthesized,
            }),
            fulfillment_order_id: None,
        }
    }

    #[test]
    fn test_invoice_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).unwrap();
        assert_eq!(Order::invoice_number(at, 0xABC), "INV-20260504-000ABC");
        assert_eq!(Order::invoice_number(at, u32::MAX), "INV-20260504-FFFFFF");
    }

    #[test]
    fn test_transition_once() {
        let mut order = order();
        order.transition_to(OrderStatus::Confirmed).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let err = order.transition_to(OrderStatus::Failed).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn test_synthesized_registration_needs_verification() {
        let mut order = order();
        assert!(order.needs_registration_verification());

        order.registration = Some(RegistrationRecord {
            id: RegistrationId::new("REG-9"),
            provenance: Provenance::Live,
        });
        assert!(!order.needs_registration_verification());
    }

    #[test]
    fn test_order_serde_round_trip_keeps_snapshot() {
        let order = order();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["kind"], "domain");
        let parsed: Order = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, order);
    }
}
