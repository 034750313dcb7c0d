//! Domain names under management and their DNS records.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    Currency, DnsRecordId, DnsRecordType, DomainId, Email, Provenance, WalletAddress,
};

/// TLD used when a search keyword does not name one.
pub const DEFAULT_TLD: &str = ".com";

/// Default DNS record TTL in seconds.
pub const DEFAULT_TTL: u32 = 3600;

/// Errors raised by domain state changes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The domain already has an owner.
    #[error("{0} is already owned")]
    AlreadyOwned(String),
    /// Registration length must be at least one year.
    #[error("registration must be for at least one year")]
    InvalidYears,
}

/// A normalized `name` + `.tld` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainName {
    /// Second-level label (e.g. `example`).
    pub name: String,
    /// Dot-prefixed TLD (e.g. `.io`).
    pub tld: String,
}

impl DomainName {
    /// Normalize a free-form search keyword into a domain name.
    ///
    /// Lowercases, strips a URL scheme, a leading `www.` and any path, splits
    /// at the first dot, and drops characters outside `[a-z0-9-]` from each
    /// label. Keywords without a TLD get [`DEFAULT_TLD`]. Returns `None` if
    /// no usable name remains.
    ///
    /// ```
    /// use chainmart_core::DomainName;
    ///
    /// let name = DomainName::from_keyword("https://www.Example.IO/shop").unwrap();
    /// assert_eq!(name.full_name(), "example.io");
    ///
    /// let name = DomainName::from_keyword("my shop").unwrap();
    /// assert_eq!(name.full_name(), "myshop.com");
    /// ```
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let lowered = keyword.trim().to_lowercase();
        let without_scheme = lowered
            .split_once("://")
            .map_or(lowered.as_str(), |(_, rest)| rest);
        let host = without_scheme.split('/').next().unwrap_or_default();
        let host = host.strip_prefix("www.").unwrap_or(host);

        let (raw_name, raw_tld) = host.split_once('.').unwrap_or((host, ""));
        let name = clean_label(raw_name);
        if name.is_empty() {
            return None;
        }

        let tld = raw_tld
            .split('.')
            .map(clean_label)
            .filter(|label| !label.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        let tld = if tld.is_empty() {
            DEFAULT_TLD.to_owned()
        } else {
            format!(".{tld}")
        };

        Some(Self { name, tld })
    }

    /// Full name (`example.io`).
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.tld)
    }

    /// The same label on a different TLD.
    #[must_use]
    pub fn with_tld(&self, tld: &str) -> Self {
        Self {
            name: self.name.clone(),
            tld: tld.to_owned(),
        }
    }
}

fn clean_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect::<String>()
        .trim_matches('-')
        .to_owned()
}

/// Email forwarding configured on a domain (`alias@domain` → `target`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailForwarding {
    /// Local part on the domain that receives mail (e.g. `info`).
    pub alias: String,
    /// Mailbox that forwarded mail is delivered to.
    pub target: Email,
}

/// A DNS record belonging to exactly one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: DnsRecordId,
    pub record_type: DnsRecordType,
    pub host: String,
    pub value: String,
    pub ttl: u32,
}

impl DnsRecord {
    /// Create a record with the default TTL.
    #[must_use]
    pub fn new(
        id: impl Into<DnsRecordId>,
        record_type: DnsRecordType,
        host: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            record_type,
            host: host.into(),
            value: value.into(),
            ttl: DEFAULT_TTL,
        }
    }
}

/// A domain name under management.
///
/// A domain is purchasable while `owner` is `None`. Ownership is assigned
/// through [`Domain::assign_owner`], which also delists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub tld: String,
    pub full_name: String,
    pub price: Decimal,
    pub currency: Currency,
    pub premium: bool,
    pub owner: Option<WalletAddress>,
    pub listed: bool,
    pub registered_at: Option<DateTime<Utc>>,
    pub renews_at: Option<DateTime<Utc>>,
    pub privacy: bool,
    pub auto_renew: bool,
    pub nameservers: Vec<String>,
    pub dns_records: Vec<DnsRecord>,
    pub email_forwarding: Option<EmailForwarding>,
    pub provenance: Provenance,
}

impl Domain {
    /// A purchasable listing for `name`.
    #[must_use]
    pub fn listing(
        name: &DomainName,
        price: Decimal,
        currency: Currency,
        premium: bool,
        provenance: Provenance,
    ) -> Self {
        let full_name = name.full_name();
        Self {
            id: DomainId::new(full_name.clone()),
            name: name.name.clone(),
            tld: name.tld.clone(),
            full_name,
            price,
            currency,
            premium,
            owner: None,
            listed: true,
            registered_at: None,
            renews_at: None,
            privacy: false,
            auto_renew: false,
            nameservers: Vec::new(),
            dns_records: Vec::new(),
            email_forwarding: None,
            provenance,
        }
    }

    /// Whether the domain can be bought.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.owner.is_none()
    }

    /// Transfer ownership to `owner` for `years` starting at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::AlreadyOwned`] if the domain has an owner, or
    /// [`DomainError::InvalidYears`] if `years` is zero.
    pub fn assign_owner(
        &mut self,
        owner: WalletAddress,
        at: DateTime<Utc>,
        years: u32,
    ) -> Result<(), DomainError> {
        if !self.is_purchasable() {
            return Err(DomainError::AlreadyOwned(self.full_name.clone()));
        }
        if years == 0 {
            return Err(DomainError::InvalidYears);
        }

        self.owner = Some(owner);
        self.listed = false;
        self.registered_at = Some(at);
        self.renews_at = at.checked_add_months(Months::new(years.saturating_mul(12)));
        Ok(())
    }

    /// Add a DNS record, replacing any record with the same id.
    pub fn add_dns_record(&mut self, record: DnsRecord) {
        self.dns_records.retain(|existing| existing.id != record.id);
        self.dns_records.push(record);
    }

    /// Remove a DNS record. Returns whether a record was removed.
    pub fn remove_dns_record(&mut self, id: &DnsRecordId) -> bool {
        let before = self.dns_records.len();
        self.dns_records.retain(|record| &record.id != id);
        self.dns_records.len() != before
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn owner() -> WalletAddress {
        WalletAddress::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap()
    }

    fn listing(keyword: &str) -> Domain {
        let name = DomainName::from_keyword(keyword).unwrap();
        Domain::listing(&name, Decimal::new(3999, 2), Currency::Usdt, true, Provenance::Live)
    }

    #[test]
    fn test_keyword_defaults_to_com() {
        let name = DomainName::from_keyword("Harbor").unwrap();
        assert_eq!(name.name, "harbor");
        assert_eq!(name.tld, ".com");
    }

    #[test]
    fn test_keyword_keeps_multi_label_tld() {
        let name = DomainName::from_keyword("shop.co.uk").unwrap();
        assert_eq!(name.full_name(), "shop.co.uk");
    }

    #[test]
    fn test_keyword_strips_noise() {
        let name = DomainName::from_keyword("http://www.-my_shop!.io/path").unwrap();
        assert_eq!(name.full_name(), "myshop.io");
    }

    #[test]
    fn test_empty_keyword() {
        assert!(DomainName::from_keyword("   ").is_none());
        assert!(DomainName::from_keyword("!!!.com").is_none());
    }

    #[test]
    fn test_listing_is_purchasable() {
        let domain = listing("example.io");
        assert!(domain.is_purchasable());
        assert!(domain.listed);
        assert_eq!(domain.full_name, "example.io");
        assert_eq!(domain.id.as_str(), "example.io");
    }

    #[test]
    fn test_assign_owner_delists() {
        let mut domain = listing("example.io");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        domain.assign_owner(owner(), at, 2).unwrap();

        assert_eq!(domain.owner, Some(owner()));
        assert!(!domain.listed);
        assert!(!domain.is_purchasable());
        assert_eq!(domain.registered_at, Some(at));
        assert_eq!(
            domain.renews_at,
            Some(Utc.with_ymd_and_hms(2028, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_assign_owner_twice_fails() {
        let mut domain = listing("example.io");
        domain.assign_owner(owner(), Utc::now(), 1).unwrap();
        assert_eq!(
            domain.assign_owner(owner(), Utc::now(), 1),
            Err(DomainError::AlreadyOwned("example.io".to_owned()))
        );
    }

    #[test]
    fn test_assign_owner_zero_years() {
        let mut domain = listing("example.io");
        assert_eq!(
            domain.assign_owner(owner(), Utc::now(), 0),
            Err(DomainError::InvalidYears)
        );
        assert!(domain.is_purchasable());
    }

    #[test]
    fn test_dns_records() {
        let mut domain = listing("example.io");
        domain.add_dns_record(DnsRecord::new("r1", DnsRecordType::A, "@", "203.0.113.7"));
        domain.add_dns_record(DnsRecord::new("r2", DnsRecordType::Txt, "@", "v=spf1 -all"));
        domain.add_dns_record(DnsRecord::new("r1", DnsRecordType::A, "@", "203.0.113.8"));

        assert_eq!(domain.dns_records.len(), 2);
        assert!(domain.remove_dns_record(&DnsRecordId::new("r2")));
        assert!(!domain.remove_dns_record(&DnsRecordId::new("r2")));
        assert_eq!(domain.dns_records[0].value, "203.0.113.8");
    }
}
