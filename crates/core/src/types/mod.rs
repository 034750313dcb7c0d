//! Core types for Chainmart.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod currency;
pub mod email;
pub mod id;
pub mod status;

pub use address::{AddressError, TxHash, WalletAddress};
pub use currency::{Currency, CurrencyError};
pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
