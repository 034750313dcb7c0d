//! Purchase orchestration.
//!
//! A [`Checkout`] walks `Idle → Configuring → AwaitingPayment → Confirming →
//! Provisioning → Persisting → Complete`. Each step returns a
//! [`StepResult`](state::StepResult) and [`Orchestrator::run`] is the only
//! place that decides what happens next:
//!
//! - `Advance` moves on.
//! - `SoftFail` moves on and records a warning on the receipt.
//! - `HardFail` ends in `Failed(reason)`.
//! - `Invalid` stays in `Configuring` and hands the error back to the buyer.
//!
//! Submitting the payment is the point of no return. Nothing after it rolls
//! back, and nothing that touches the registrar or the fulfillment service
//! runs before the payment is confirmed.

pub mod flow;
pub mod state;
pub mod validation;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::chain::{ChainGateway, ConnectorKind, JsonRpcWallet, NetworkConfig, ProviderError};
use crate::fulfillment::{FulfillmentClient, FulfillmentError, FulfillmentService};
use crate::registrar::{
    DegradedModePolicy, FollowUpConfig, FollowUpQueue, ProxyTransport, RegistrarClient,
    RegistrarError,
};
use crate::store::{
    CartService, DisabledRemoteStore, FileStore, HttpRemoteStore, LocalStore, OrderBook,
    RemoteOrderStore, StoreError, StoreEvents,
};

pub use flow::{Checkout, CheckoutReceipt, Purchase};
pub use state::{CheckoutState, FailureReason};
pub use validation::{
    DomainConfiguration, DomainPlan, ForwardingForm, GoodsPlan, ShippingForm, ValidationError,
};

use state::StepResult;

/// Default bound on waiting for a payment confirmation.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Default delivery estimate for goods orders.
pub const DEFAULT_DELIVERY_ESTIMATE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Why [`Orchestrator::run`] stopped short of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Fix the input and run again.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The checkout ended in `Failed`.
    #[error(transparent)]
    Failed(#[from] FailureReason),

    /// The checkout already completed; start a new one.
    #[error("This checkout is already complete")]
    Finished,

    /// The purchase can no longer be changed.
    #[error("This checkout can no longer be changed")]
    Locked,
}

/// Checkout tuning.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub confirmation_timeout: Duration,
    pub delivery_estimate: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            delivery_estimate: DEFAULT_DELIVERY_ESTIMATE,
        }
    }
}

/// Everything a checkout talks to.
#[derive(Clone)]
pub struct CheckoutDeps {
    pub gateway: Arc<ChainGateway>,
    pub registrar: RegistrarClient,
    pub follow_ups: FollowUpQueue,
    pub fulfillment: Arc<dyn FulfillmentService>,
    pub remote: Arc<dyn RemoteOrderStore>,
    pub cart: CartService,
    pub orders: OrderBook,
}

/// Errors that can occur while wiring production dependencies.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("wallet provider: {0}")]
    Wallet(#[from] ProviderError),

    #[error("registrar client: {0}")]
    Registrar(#[from] RegistrarError),

    #[error("fulfillment client: {0}")]
    Fulfillment(#[from] FulfillmentError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Where a buyer-side checkout finds its collaborators.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin of the storefront server (its `/api` routes are used).
    pub storefront_url: String,
    /// JSON-RPC endpoint of the buyer's wallet.
    pub wallet_rpc_url: String,
    pub network: NetworkConfig,
    pub data_dir: PathBuf,
    pub policy: DegradedModePolicy,
    pub follow_ups: FollowUpConfig,
    /// Mirror orders to the server.
    pub remote_persistence: bool,
}

impl CheckoutDeps {
    /// Build production dependencies.
    ///
    /// Registrar, fulfillment and remote persistence go through the
    /// storefront server's proxy routes. Local state lives in a
    /// [`FileStore`] under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or the data
    /// directory cannot be created.
    pub async fn connect(settings: &ClientSettings) -> Result<Self, SetupError> {
        let api = format!("{}/api", settings.storefront_url.trim_end_matches('/'));

        let wallet = Arc::new(JsonRpcWallet::new(
            settings.wallet_rpc_url.clone(),
            ConnectorKind::Injected,
        )?);
        let gateway = Arc::new(ChainGateway::new(settings.network.clone()).with_injected(wallet));

        let transport = Arc::new(ProxyTransport::new(format!("{api}/registrar"))?);
        let registrar = RegistrarClient::new(transport, settings.policy);
        let follow_ups = FollowUpQueue::spawn(registrar.clone(), settings.follow_ups);

        let fulfillment = Arc::new(FulfillmentClient::new(format!("{api}/fulfillment"))?);
        let remote: Arc<dyn RemoteOrderStore> = if settings.remote_persistence {
            Arc::new(HttpRemoteStore::new(api)?)
        } else {
            Arc::new(DisabledRemoteStore)
        };

        let local: Arc<dyn LocalStore> = Arc::new(FileStore::open(&settings.data_dir).await?);
        let events = StoreEvents::new();

        Ok(Self {
            gateway,
            registrar,
            follow_ups,
            fulfillment,
            remote,
            cart: CartService::new(Arc::clone(&local), events.clone()),
            orders: OrderBook::new(local, events),
        })
    }
}

/// Drives checkouts to completion.
#[derive(Clone)]
pub struct Orchestrator {
    deps: CheckoutDeps,
    config: CheckoutConfig,
}

impl Orchestrator {
    #[must_use]
    pub const fn new(deps: CheckoutDeps, config: CheckoutConfig) -> Self {
        Self { deps, config }
    }

    #[must_use]
    pub const fn deps(&self) -> &CheckoutDeps {
        &self.deps
    }

    #[must_use]
    pub const fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Run `checkout` until it completes, fails, or needs corrected input.
    ///
    /// A checkout that stopped on [`CheckoutError::Invalid`] can be fixed
    /// with [`Checkout::configure_domain`] or [`Checkout::update_shipping`]
    /// and run again.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Invalid`] when validation fails (state stays
    ///   `Configuring`)
    /// - [`CheckoutError::Failed`] when the checkout ends in `Failed`
    /// - [`CheckoutError::Finished`] when the checkout already completed
    #[instrument(skip_all, fields(kind = checkout.purchase().kind().as_str()))]
    pub async fn run(&self, checkout: &mut Checkout) -> Result<CheckoutReceipt, CheckoutError> {
        loop {
            match checkout.state.clone() {
                CheckoutState::Complete => return Err(CheckoutError::Finished),
                CheckoutState::Failed(reason) => return Err(CheckoutError::Failed(reason)),
                _ => {}
            }

            let outcome = AssertUnwindSafe(self.step(checkout)).catch_unwind().await;
            let result = outcome.unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(state = ?checkout.state, panic = %message, "Checkout step panicked");
                StepResult::HardFail(FailureReason::Unexpected(message))
            });

            match result {
                StepResult::Advance => advance(checkout),
                StepResult::SoftFail(warning) => {
                    warn!(state = ?checkout.state, warning = %warning, "Checkout step degraded");
                    checkout.warnings.push(warning);
                    advance(checkout);
                }
                StepResult::HardFail(reason) => {
                    error!(
                        state = ?checkout.state,
                        reason = %reason,
                        payment_broadcast = checkout.state.is_past_payment(),
                        tx_hash = ?checkout.tx_hash(),
                        "Checkout failed"
                    );
                    transition(checkout, CheckoutState::Failed(reason.clone()));
                    return Err(CheckoutError::Failed(reason));
                }
                StepResult::Invalid(error) => {
                    info!(error = %error, "Checkout input rejected");
                    return Err(CheckoutError::Invalid(error));
                }
            }

            if checkout.state == CheckoutState::Complete {
                if let Some(receipt) = checkout.receipt.as_mut() {
                    receipt.warnings.clone_from(&checkout.warnings);
                    return Ok(receipt.clone());
                }
                let reason = FailureReason::Unexpected("no receipt was produced".to_owned());
                transition(checkout, CheckoutState::Failed(reason.clone()));
                return Err(CheckoutError::Failed(reason));
            }
        }
    }

    async fn step(&self, checkout: &mut Checkout) -> StepResult {
        match checkout.state {
            CheckoutState::Idle => checkout.ensure_wallet(&self.deps).await,
            CheckoutState::Configuring => checkout.validate(&self.deps).await,
            CheckoutState::AwaitingPayment => checkout.submit_payment(&self.deps).await,
            CheckoutState::Confirming => checkout.await_confirmation(&self.config).await,
            CheckoutState::Provisioning => checkout.provision(&self.deps).await,
            CheckoutState::Persisting => checkout.persist(&self.deps, &self.config).await,
            CheckoutState::Complete | CheckoutState::Failed(_) => StepResult::Advance,
        }
    }
}

fn advance(checkout: &mut Checkout) {
    if let Some(next) = checkout.state.successor() {
        transition(checkout, next);
    }
}

fn transition(checkout: &mut Checkout, next: CheckoutState) {
    info!(from = ?checkout.state, to = ?next, "Checkout transition");
    checkout.history.push(next.clone());
    checkout.state = next;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "checkout step panicked".to_owned())
}
