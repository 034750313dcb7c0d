//! Status enums for various entities.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// Orders start as `Processing` and may move exactly once, to either
/// `Confirmed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Confirmed,
    Failed,
}

impl OrderStatus {
    /// Whether an order in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Confirmed | Self::Failed)
        )
    }

    /// Lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// What an order paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Physical or print-on-demand goods from the cart.
    Goods,
    /// A domain name registration.
    Domain,
}

impl OrderKind {
    /// Lowercase wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goods => "goods",
            Self::Domain => "domain",
        }
    }
}

impl FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goods" => Ok(Self::Goods),
            "domain" => Ok(Self::Domain),
            _ => Err(format!("invalid order kind: {s}")),
        }
    }
}

/// Where a record came from.
///
/// Registrar data is `Live`; placeholders produced while the registrar is
/// unreachable are `Synthesized` and must never be presented as fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Live,
    Synthesized,
}

impl Provenance {
    /// Whether the record was produced locally rather than by the upstream.
    #[must_use]
    pub const fn is_synthesized(self) -> bool {
        matches!(self, Self::Synthesized)
    }
}

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// IPv4 address record.
    A,
    /// Canonical name (alias) record.
    Cname,
    /// Mail exchange record.
    Mx,
    /// Free-form text record.
    Txt,
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::Cname => f.write_str("CNAME"),
            Self::Mx => f.write_str("MX"),
            Self::Txt => f.write_str("TXT"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Confirmed,
            OrderStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_dns_record_type_serde() {
        assert_eq!(serde_json::to_string(&DnsRecordType::Cname).unwrap(), "\"CNAME\"");
        assert_eq!(DnsRecordType::Mx.to_string(), "MX");
    }
}
