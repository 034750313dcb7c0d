//! Human-unit ↔ base-unit conversion and ERC20 calldata.
//!
//! Amounts travel through the storefront as [`Decimal`] in human units
//! (`12.99`). The chain only understands integer base units, so every amount
//! is scaled by `10^decimals` into a [`U256`] before it is sent.

use primitive_types::U256;
use rust_decimal::Decimal;
use thiserror::Error;

use chainmart_core::WalletAddress;

/// `transfer(address,uint256)` selector.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `balanceOf(address)` selector.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Largest mantissa a [`Decimal`] can carry.
const DECIMAL_MANTISSA_BITS: usize = 96;

/// Errors converting between human and base units.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount has {scale} fractional digits, currency allows {decimals}")]
    TooPrecise { scale: u32, decimals: u32 },

    #[error("amount does not fit in 256 bits")]
    Overflow,

    #[error("invalid hex quantity: {0}")]
    InvalidQuantity(String),
}

/// Scale a human-unit amount to integer base units.
///
/// # Errors
///
/// Returns [`UnitsError::Negative`] for negative amounts and
/// [`UnitsError::TooPrecise`] when the amount has more fractional digits
/// than `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative);
    }

    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > decimals {
        return Err(UnitsError::TooPrecise { scale, decimals });
    }

    let mantissa = u128::try_from(amount.mantissa()).map_err(|_| UnitsError::Negative)?;
    let factor = U256::exp10((decimals - scale) as usize);
    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or(UnitsError::Overflow)
}

/// Convert base units back to a human-unit amount.
///
/// Values too large for a [`Decimal`] lose trailing fractional digits first;
/// `None` is returned only when even the integer part does not fit.
#[must_use]
pub fn from_base_units(value: U256, decimals: u32) -> Option<Decimal> {
    let ten = U256::from(10_u8);
    let mut value = value;
    let mut scale = decimals;
    while value.bits() > DECIMAL_MANTISSA_BITS && scale > 0 {
        value /= ten;
        scale -= 1;
    }
    if value.bits() > DECIMAL_MANTISSA_BITS {
        return None;
    }

    let mantissa = i128::try_from(value.as_u128()).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .ok()
        .map(|amount| amount.normalize())
}

/// Parse a JSON-RPC hex quantity (`0x1a`).
///
/// # Errors
///
/// Returns [`UnitsError::InvalidQuantity`] if the string is not `0x`-prefixed
/// hex.
pub fn parse_quantity(quantity: &str) -> Result<U256, UnitsError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| UnitsError::InvalidQuantity(quantity.to_owned()))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).map_err(|_| UnitsError::InvalidQuantity(quantity.to_owned()))
}

/// Render a value as a JSON-RPC hex quantity.
#[must_use]
pub fn format_quantity(value: U256) -> String {
    format!("{value:#x}")
}

/// Calldata for `transfer(to, amount)`.
#[must_use]
pub fn encode_transfer(to: &WalletAddress, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&uint_word(amount));
    data
}

/// Calldata for `balanceOf(owner)`.
#[must_use]
pub fn encode_balance_of(owner: &WalletAddress) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&address_word(owner));
    data
}

/// Read the first 32-byte word of an ABI-encoded return value as a uint.
#[must_use]
pub fn decode_uint(output: &[u8]) -> Option<U256> {
    output.get(..32).map(U256::from_big_endian)
}

/// Left-pad an address to a 32-byte ABI word.
fn address_word(address: &WalletAddress) -> [u8; 32] {
    let mut word = [0_u8; 32];
    let body = address.as_str().trim_start_matches("0x");
    // WalletAddress guarantees 40 hex characters.
    if let Ok(bytes) = hex::decode(body) {
        for (slot, byte) in word.iter_mut().skip(12).zip(bytes) {
            *slot = byte;
        }
    }
    word
}

fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0_u8; 32];
    value.to_big_endian(&mut word);
    word
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address() -> WalletAddress {
        WalletAddress::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap()
    }

    #[test]
    fn test_to_base_units_scales_by_decimals() {
        let value = to_base_units(Decimal::new(1299, 2), 18).unwrap();
        assert_eq!(value, U256::from(1299_u64) * U256::exp10(16));
    }

    #[test]
    fn test_to_base_units_whole_amount() {
        let value = to_base_units(Decimal::from(3), 6).unwrap();
        assert_eq!(value, U256::from(3_000_000_u64));
    }

    #[test]
    fn test_to_base_units_ignores_trailing_zeros() {
        // 1.50000 has scale 5 but only one significant fractional digit
        let value = to_base_units(Decimal::new(150_000, 5), 2).unwrap();
        assert_eq!(value, U256::from(150_u64));
    }

    #[test]
    fn test_to_base_units_rejects_negative() {
        assert_eq!(
            to_base_units(Decimal::new(-1, 0), 18),
            Err(UnitsError::Negative)
        );
    }

    #[test]
    fn test_to_base_units_rejects_excess_precision() {
        assert_eq!(
            to_base_units(Decimal::new(1_234, 3), 2),
            Err(UnitsError::TooPrecise {
                scale: 3,
                decimals: 2
            })
        );
    }

    #[test]
    fn test_from_base_units() {
        let value = U256::from(3999_u64) * U256::exp10(16);
        assert_eq!(from_base_units(value, 18), Some(Decimal::new(3999, 2)));
        assert_eq!(from_base_units(U256::zero(), 18), Some(Decimal::ZERO));
    }

    #[test]
    fn test_from_base_units_huge_value_truncates_fraction() {
        // 10^30 base units at 18 decimals = 10^12 whole units
        let value = U256::exp10(30);
        assert_eq!(
            from_base_units(value, 18),
            Some(Decimal::from(1_000_000_000_000_i64))
        );
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x38").unwrap(), U256::from(56_u8));
        assert_eq!(parse_quantity("0x").unwrap(), U256::zero());
        assert!(parse_quantity("38").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(U256::from(56_u8)), "0x38");
        assert_eq!(format_quantity(U256::zero()), "0x0");
    }

    #[test]
    fn test_encode_transfer_layout() {
        let data = encode_transfer(&address(), U256::from(1_u8));
        assert_eq!(data.len(), 68);
        assert_eq!(hex::encode(&data[..4]), "a9059cbb");
        assert_eq!(
            hex::encode(&data[4..36]),
            "00000000000000000000000052908400098527886e0f7030069857d2e4169ee7"
        );
        assert_eq!(data[67], 1);
    }

    #[test]
    fn test_encode_balance_of_layout() {
        let data = encode_balance_of(&address());
        assert_eq!(data.len(), 36);
        assert_eq!(hex::encode(&data[..4]), "70a08231");
    }

    #[test]
    fn test_decode_uint() {
        let mut word = [0_u8; 32];
        word[31] = 42;
        assert_eq!(decode_uint(&word), Some(U256::from(42_u8)));
        assert_eq!(decode_uint(&word[..10]), None);
    }
}
