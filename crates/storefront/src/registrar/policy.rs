//! Degraded-mode behaviour for registrar outages.
//!
//! When the registrar cannot be reached the storefront can keep selling:
//! search falls back to synthesized candidates, availability checks fail
//! open, and registrations get a locally generated id. Each of these is a
//! separate switch on [`DegradedModePolicy`].

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use chainmart_core::{Currency, Domain, DomainName, Provenance};

/// TLD offered as the premium alternative in fallback results.
pub const PREMIUM_TLD: &str = ".io";

/// Fallback price for the keyword's own TLD (12.99).
pub const FALLBACK_PRICE: Decimal = Decimal::from_parts(1299, 0, 0, false, 2);

/// Fallback price for the premium alternative (39.99).
pub const PREMIUM_FALLBACK_PRICE: Decimal = Decimal::from_parts(3999, 0, 0, false, 2);

/// Error parsing a policy name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown degraded mode '{0}' (expected 'lenient' or 'strict')")]
pub struct PolicyParseError(pub String);

/// Which registrar failures the storefront papers over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegradedModePolicy {
    /// Synthesize search candidates when search fails or returns nothing.
    pub fallback_search: bool,
    /// Treat a failed availability check as "available".
    pub fail_open_availability: bool,
    /// Hand out a local registration id when registration fails.
    pub synthesize_registration: bool,
}

impl DegradedModePolicy {
    /// Every fallback enabled.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            fallback_search: true,
            fail_open_availability: true,
            synthesize_registration: true,
        }
    }

    /// Every fallback disabled; registrar failures surface as errors.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            fallback_search: false,
            fail_open_availability: false,
            synthesize_registration: false,
        }
    }
}

impl Default for DegradedModePolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

impl FromStr for DegradedModePolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::lenient()),
            "strict" => Ok(Self::strict()),
            other => Err(PolicyParseError(other.to_owned())),
        }
    }
}

/// Deterministic stand-in results for a search the registrar could not
/// answer.
///
/// Always the keyword's own name at [`FALLBACK_PRICE`], plus the same label
/// on [`PREMIUM_TLD`] at [`PREMIUM_FALLBACK_PRICE`] unless the keyword
/// already is on that TLD.
#[must_use]
pub fn fallback_candidates(name: &DomainName) -> Vec<Domain> {
    let mut candidates = vec![Domain::listing(
        name,
        FALLBACK_PRICE,
        Currency::Usdt,
        false,
        Provenance::Synthesized,
    )];

    if name.tld != PREMIUM_TLD {
        candidates.push(Domain::listing(
            &name.with_tld(PREMIUM_TLD),
            PREMIUM_FALLBACK_PRICE,
            Currency::Usdt,
            true,
            Provenance::Synthesized,
        ));
    }
    candidates
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prices() {
        assert_eq!(FALLBACK_PRICE, Decimal::new(1299, 2));
        assert_eq!(PREMIUM_FALLBACK_PRICE, Decimal::new(3999, 2));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "Strict".parse::<DegradedModePolicy>().unwrap(),
            DegradedModePolicy::strict()
        );
        assert_eq!(
            "lenient".parse::<DegradedModePolicy>().unwrap(),
            DegradedModePolicy::default()
        );
        assert!("sometimes".parse::<DegradedModePolicy>().is_err());
    }

    #[test]
    fn test_fallback_com_adds_io() {
        let name = DomainName::from_keyword("harbor").unwrap();
        let candidates = fallback_candidates(&name);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].full_name, "harbor.com");
        assert_eq!(candidates[0].price, FALLBACK_PRICE);
        assert!(!candidates[0].premium);
        assert_eq!(candidates[1].full_name, "harbor.io");
        assert_eq!(candidates[1].price, PREMIUM_FALLBACK_PRICE);
        assert!(candidates[1].premium);
        assert!(candidates.iter().all(|d| d.provenance.is_synthesized()));
    }

    #[test]
    fn test_fallback_io_keyword_single_candidate() {
        let name = DomainName::from_keyword("harbor.io").unwrap();
        let candidates = fallback_candidates(&name);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].full_name, "harbor.io");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let name = DomainName::from_keyword("Example").unwrap();
        assert_eq!(fallback_candidates(&name), fallback_candidates(&name));
    }
}
