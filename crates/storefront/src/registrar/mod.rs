//! Domain registrar client.
//!
//! Commands go through the storefront's same-origin proxy
//! (`/api/registrar`), which injects the registrar credential. Responses
//! are parsed into a [`CommandResponse`] whose `success` flag is the only
//! thing callers branch on.
//!
//! # Architecture
//!
//! - [`RegistrarClient`] - search, availability, registration, and the
//!   follow-up commands; search results cached for 5 minutes
//! - [`RegistrarTransport`] - how a command reaches the registrar
//!   ([`ProxyTransport`] in production)
//! - [`DegradedModePolicy`] - which registrar failures are papered over
//! - [`FollowUpQueue`] - at-least-once delivery of post-registration
//!   configuration commands

pub mod client;
pub mod followup;
pub mod policy;
pub mod transport;
pub mod wire;

use thiserror::Error;

pub use client::{Command, RegistrarClient, SearchResults};
pub use followup::{FollowUpCommand, FollowUpConfig, FollowUpQueue, ReconciliationEntry};
pub use policy::{DegradedModePolicy, PolicyParseError, fallback_candidates};
pub use transport::{ProxyTransport, RegistrarTransport};
pub use wire::CommandResponse;

/// Errors that can occur when talking to the registrar.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The proxy or registrar answered with a non-success status.
    #[error("Registrar API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The registrar could not be reached.
    #[error("Registrar unavailable: {0}")]
    Unavailable(String),

    /// The registrar answered but refused the command.
    #[error("Registrar rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
}
