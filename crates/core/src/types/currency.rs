//! Payment currencies.
//!
//! Chainmart settles on a single chain with exactly two payment rails: the
//! chain's native coin and one ERC20-style stablecoin. Amounts are kept in
//! human units (`12.99`) as [`rust_decimal::Decimal`]; conversion to on-chain base units
//! happens at the gateway using [`Currency::decimals`].

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Currency`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported currency: {0}")]
pub struct CurrencyError(pub String);

/// Payment currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Native coin of the settlement chain (value transfer).
    Bnb,
    /// Stablecoin token (contract `transfer` call).
    #[default]
    Usdt,
}

impl Currency {
    /// Every supported currency, native first.
    pub const ALL: [Self; 2] = [Self::Bnb, Self::Usdt];

    /// Ticker code (e.g. `USDT`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Bnb => "BNB",
            Self::Usdt => "USDT",
        }
    }

    /// Number of decimal places in the currency's base unit.
    #[must_use]
    pub const fn decimals(self) -> u32 {
        match self {
            // Both wei and BEP20 USDT use 18 decimals.
            Self::Bnb | Self::Usdt => 18,
        }
    }

    /// Whether payments are plain value transfers rather than token calls.
    #[must_use]
    pub const fn is_native(self) -> bool {
        matches!(self, Self::Bnb)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BNB" => Ok(Self::Bnb),
            "USDT" => Ok(Self::Usdt),
            _ => Err(CurrencyError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parse() {
        assert_eq!("usdt".parse::<Currency>().unwrap(), Currency::Usdt);
        assert_eq!(" BNB ".parse::<Currency>().unwrap(), Currency::Bnb);
        assert!("ETH".parse::<Currency>().is_err());
    }

    #[test]
    fn test_currency_serde_uses_ticker() {
        assert_eq!(serde_json::to_string(&Currency::Usdt).unwrap(), "\"USDT\"");
        assert_eq!(
            serde_json::from_str::<Currency>("\"BNB\"").unwrap(),
            Currency::Bnb
        );
    }

    #[test]
    fn test_only_bnb_is_native() {
        assert!(Currency::Bnb.is_native());
        assert!(!Currency::Usdt.is_native());
    }
}
