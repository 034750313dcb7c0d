//! Chainmart storefront library.
//!
//! Checkout orchestration, the external clients it drives, local and remote
//! order storage, and the proxy server that keeps upstream credentials off
//! the client.
//!
//! # Modules
//!
//! - [`chain`] - Wallet connection, balances, and payments
//! - [`registrar`] - Domain search, registration, and follow-up commands
//! - [`fulfillment`] - Print-on-demand order placement
//! - [`store`] - Cart, order book, and the remote order mirror
//! - [`checkout`] - The purchase state machine
//! - [`routes`], [`middleware`], [`state`], [`config`], [`error`] - HTTP server

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod chain;
pub mod checkout;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod middleware;
pub mod registrar;
pub mod routes;
pub mod state;
pub mod store;
