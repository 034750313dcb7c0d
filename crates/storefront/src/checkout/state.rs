//! Checkout states and step outcomes.

use serde::Serialize;
use thiserror::Error;

use super::validation::ValidationError;

/// Where a checkout is.
///
/// The happy path is strictly linear. `Failed` is absorbing and reachable
/// from every state except `Complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    Configuring,
    AwaitingPayment,
    Confirming,
    Provisioning,
    Persisting,
    Complete,
    Failed(FailureReason),
}

impl CheckoutState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }

    /// The next state on the happy path.
    #[must_use]
    pub const fn successor(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Configuring),
            Self::Configuring => Some(Self::AwaitingPayment),
            Self::AwaitingPayment => Some(Self::Confirming),
            Self::Confirming => Some(Self::Provisioning),
            Self::Provisioning => Some(Self::Persisting),
            Self::Persisting => Some(Self::Complete),
            Self::Complete | Self::Failed(_) => None,
        }
    }

    /// Whether a payment may already have been broadcast.
    #[must_use]
    pub const fn is_past_payment(&self) -> bool {
        matches!(
            self,
            Self::Confirming | Self::Provisioning | Self::Persisting | Self::Complete
        )
    }
}

/// Why a checkout failed. The message is shown to the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("No wallet connected: {0}")]
    NoWallet(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Payment failed on chain: {0}")]
    ConfirmationFailed(String),

    #[error("Payment was not confirmed within {0} seconds")]
    ConfirmationTimeout(u64),

    #[error("Domain registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Order could not be saved: {0}")]
    PersistenceFailed(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Outcome of one checkout step.
#[derive(Debug)]
pub(crate) enum StepResult {
    /// Move to the next state.
    Advance,
    /// Move to the next state and record a warning.
    SoftFail(String),
    /// Stop in `Failed`.
    HardFail(FailureReason),
    /// Input is invalid; stay put so the buyer can fix it.
    Invalid(ValidationError),
}
