//! Chainmart Core - Shared types library.
//!
//! This crate provides the types shared by every Chainmart component:
//! - `storefront` - Checkout orchestration, external clients, and the proxy server
//! - `integration-tests` - End-to-end checkout scenarios against in-memory fakes
//!
//! # Architecture
//!
//! The core crate contains only types and the invariants that belong to them -
//! no I/O, no database access, no HTTP clients. Anything that talks to a wallet,
//! a registrar, or a datastore lives in the storefront crate.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, currencies, emails, addresses, and statuses
//! - [`models`] - Domains, DNS records, carts, and orders

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod models;
pub mod types;

pub use models::*;
pub use types::*;
