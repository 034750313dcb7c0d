//! Chain payment gateway.
//!
//! Connects the buyer's wallet, reads balances, and submits payments to the
//! merchant on a single configured chain. Two payment rails are supported:
//! the chain's native coin (plain value transfer) and one ERC20-style token
//! (`transfer(address,uint256)` contract call).
//!
//! [`ChainGateway::pay`] never returns an error. Every failure comes back as
//! [`PaymentOutcome::Rejected`] so the caller decides what is fatal.

pub mod provider;
pub mod rpc;
pub mod units;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use chainmart_core::{Currency, TxHash, WalletAddress};

pub use provider::{
    ConnectorKind, ProviderError, TransactionReceipt, TransactionRequest, WalletProvider,
};
pub use rpc::JsonRpcWallet;

/// BNB Smart Chain mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 56;

/// Tether USD on BNB Smart Chain.
pub const DEFAULT_TOKEN_CONTRACT: &str = "0x55d398326f99059ff775485246999027b3197955";

/// Errors surfaced by the payment gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No wallet found. Install a wallet extension or connect with a mobile wallet.")]
    NoWalletFound,

    #[error("User rejected the request")]
    UserRejected,

    #[error("Wrong network: expected chain {expected}, wallet is on chain {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for GatewayError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::UserRejected => Self::UserRejected,
            other => Self::Provider(other),
        }
    }
}

/// Chain parameters the gateway pays against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// ERC20 contract for [`Currency::Usdt`].
    pub token_contract: WalletAddress,
    /// Recipient of every payment.
    pub merchant: WalletAddress,
    /// Blocks (including the inclusion block) before a payment counts.
    pub required_confirmations: u64,
    /// Receipt polling interval while confirming.
    #[serde(skip)]
    pub poll_interval: Duration,
}

impl NetworkConfig {
    /// BNB Smart Chain defaults paying to `merchant`.
    ///
    /// # Errors
    ///
    /// Never in practice; the default token contract is a valid address.
    pub fn bsc(merchant: WalletAddress) -> Result<Self, chainmart_core::AddressError> {
        Ok(Self {
            chain_id: DEFAULT_CHAIN_ID,
            token_contract: WalletAddress::parse(DEFAULT_TOKEN_CONTRACT)?,
            merchant,
            required_confirmations: 1,
            poll_interval: Duration::from_secs(3),
        })
    }
}

/// A connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSession {
    pub address: WalletAddress,
    /// Shortened address for display (`0x1234…abcd`).
    pub display_name: String,
    pub chain_id: u64,
    /// The wallet stayed on another chain after a failed switch.
    pub network_mismatch: bool,
    #[serde(skip)]
    pub connector: ConnectorKind,
}

/// Balances per currency in human units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Balances(BTreeMap<Currency, Decimal>);

impl Balances {
    /// Balance for `currency`; zero when unknown.
    #[must_use]
    pub fn get(&self, currency: Currency) -> Decimal {
        self.0.get(&currency).copied().unwrap_or_default()
    }

    fn set(&mut self, currency: Currency, amount: Decimal) {
        self.0.insert(currency, amount);
    }
}

/// Result of [`ChainGateway::pay`].
#[derive(Debug)]
pub enum PaymentOutcome {
    /// The wallet accepted and broadcast the transaction.
    Submitted(PendingPayment),
    /// Nothing was broadcast.
    Rejected(GatewayError),
}

/// A broadcast payment awaiting confirmation.
pub struct PendingPayment {
    tx_hash: TxHash,
    provider: Arc<dyn WalletProvider>,
    required_confirmations: u64,
    poll_interval: Duration,
}

impl fmt::Debug for PendingPayment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPayment")
            .field("tx_hash", &self.tx_hash)
            .field("required_confirmations", &self.required_confirmations)
            .finish_non_exhaustive()
    }
}

impl PendingPayment {
    #[must_use]
    pub const fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    /// Poll until the transaction has the required confirmations.
    ///
    /// Transient provider errors while polling are logged and retried. The
    /// caller bounds the wait.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Reverted`] if the receipt reports failure.
    #[instrument(skip(self), fields(tx_hash = %self.tx_hash))]
    pub async fn confirm(self) -> Result<TransactionReceipt, GatewayError> {
        loop {
            match self.poll().await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(GatewayError::Provider(error)) => {
                    debug!(error = %error, "Receipt poll failed, retrying");
                }
                Err(error) => return Err(error),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn poll(&self) -> Result<Option<TransactionReceipt>, GatewayError> {
        let Some(receipt) = self.provider.transaction_receipt(&self.tx_hash).await? else {
            return Ok(None);
        };
        if !receipt.succeeded {
            return Err(GatewayError::Reverted(receipt.tx_hash));
        }

        let head = self.provider.block_number().await?;
        let confirmations = head.saturating_sub(receipt.block_number).saturating_add(1);
        if confirmations >= self.required_confirmations {
            Ok(Some(receipt))
        } else {
            Ok(None)
        }
    }
}

struct ActiveWallet {
    provider: Arc<dyn WalletProvider>,
    session: WalletSession,
}

/// Wallet connection and payment submission.
pub struct ChainGateway {
    injected: Option<Arc<dyn WalletProvider>>,
    relay: Option<Arc<dyn WalletProvider>>,
    network: NetworkConfig,
    active: RwLock<Option<ActiveWallet>>,
}

impl ChainGateway {
    #[must_use]
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            injected: None,
            relay: None,
            network,
            active: RwLock::new(None),
        }
    }

    /// Use an injected wallet. Preferred over the relay connector.
    #[must_use]
    pub fn with_injected(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.injected = Some(provider);
        self
    }

    /// Use a relay connector when no injected wallet exists.
    #[must_use]
    pub fn with_relay(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.relay = Some(provider);
        self
    }

    #[must_use]
    pub const fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// The current session, if connected.
    pub async fn session(&self) -> Option<WalletSession> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Connect the buyer's wallet.
    ///
    /// Prefers the injected wallet and falls back to the relay connector.
    /// If the wallet is on another chain a switch is attempted; when that
    /// fails the session continues with `network_mismatch` set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NoWalletFound`] when neither connector is
    /// available or the wallet exposes no account, and
    /// [`GatewayError::UserRejected`] when the user declines access.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<WalletSession, GatewayError> {
        let provider = self
            .injected
            .clone()
            .or_else(|| self.relay.clone())
            .ok_or(GatewayError::NoWalletFound)?;

        let address = provider
            .request_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(GatewayError::NoWalletFound)?;

        let expected = self.network.chain_id;
        let mut chain_id = provider.chain_id().await?;
        if chain_id != expected {
            match provider.switch_chain(expected).await {
                Ok(()) => chain_id = expected,
                Err(error) => {
                    warn!(
                        expected,
                        actual = chain_id,
                        error = %error,
                        "Network switch failed, continuing on current chain"
                    );
                }
            }
        }

        let session = WalletSession {
            display_name: address.short(),
            address,
            chain_id,
            network_mismatch: chain_id != expected,
            connector: provider.kind(),
        };
        info!(
            address = %session.display_name,
            connector = ?session.connector,
            network_mismatch = session.network_mismatch,
            "Wallet connected"
        );

        *self.active.write().await = Some(ActiveWallet {
            provider,
            session: session.clone(),
        });
        Ok(session)
    }

    /// Clear the session. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        if self.active.write().await.take().is_some() {
            info!("Wallet disconnected");
        }
    }

    /// Native and token balances for `address`.
    ///
    /// Both queries run concurrently; a failing query reports zero.
    #[instrument(skip_all, fields(address = %address.short()))]
    pub async fn get_balances(&self, address: &WalletAddress) -> Balances {
        let mut balances = Balances::default();
        let Some(provider) = self.read_provider().await else {
            warn!("No wallet provider available for balance query");
            balances.set(Currency::Bnb, Decimal::ZERO);
            balances.set(Currency::Usdt, Decimal::ZERO);
            return balances;
        };

        let native = provider.native_balance(address);
        let token_call = units::encode_balance_of(address);
        let token = provider.call(&self.network.token_contract, &token_call);
        let (native, token) = tokio::join!(native, token);

        let native = native.map(Some);
        let token = token.map(|output| units::decode_uint(&output));
        for (currency, result) in [(Currency::Bnb, native), (Currency::Usdt, token)] {
            let amount = match result {
                Ok(Some(raw)) => units::from_base_units(raw, currency.decimals()),
                Ok(None) => None,
                Err(error) => {
                    warn!(currency = %currency, error = %error, "Balance query failed");
                    None
                }
            };
            balances.set(currency, amount.unwrap_or_default());
        }
        balances
    }

    /// Pay `amount` of `currency` to the merchant.
    ///
    /// Resolves as soon as the wallet broadcasts the transaction; await
    /// [`PendingPayment::confirm`] for inclusion.
    #[instrument(skip_all, fields(amount = %amount, currency = %currency))]
    pub async fn pay(&self, amount: Decimal, currency: Currency) -> PaymentOutcome {
        match self.submit(amount, currency).await {
            Ok(pending) => {
                info!(tx_hash = %pending.tx_hash, "Payment submitted");
                PaymentOutcome::Submitted(pending)
            }
            Err(error) => {
                warn!(error = %error, "Payment rejected");
                PaymentOutcome::Rejected(error)
            }
        }
    }

    async fn submit(
        &self,
        amount: Decimal,
        currency: Currency,
    ) -> Result<PendingPayment, GatewayError> {
        let (provider, session) = {
            let active = self.active.read().await;
            let active = active.as_ref().ok_or(GatewayError::NotConnected)?;
            (Arc::clone(&active.provider), active.session.clone())
        };

        let expected = self.network.chain_id;
        let actual = provider.chain_id().await?;
        if actual != expected {
            return Err(GatewayError::NetworkMismatch { expected, actual });
        }

        if amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidAmount(format!(
                "{amount} {currency} is not payable"
            )));
        }
        let base_units = units::to_base_units(amount, currency.decimals())
            .map_err(|e| GatewayError::InvalidAmount(e.to_string()))?;

        let request = if currency.is_native() {
            TransactionRequest {
                from: session.address,
                to: self.network.merchant.clone(),
                value: base_units,
                data: Vec::new(),
            }
        } else {
            TransactionRequest {
                from: session.address,
                to: self.network.token_contract.clone(),
                value: U256::zero(),
                data: units::encode_transfer(&self.network.merchant, base_units),
            }
        };

        let tx_hash = provider.send_transaction(request).await?;
        Ok(PendingPayment {
            tx_hash,
            provider,
            required_confirmations: self.network.required_confirmations.max(1),
            poll_interval: self.network.poll_interval,
        })
    }

    async fn read_provider(&self) -> Option<Arc<dyn WalletProvider>> {
        if let Some(active) = self.active.read().await.as_ref() {
            return Some(Arc::clone(&active.provider));
        }
        self.injected.clone().or_else(|| self.relay.clone())
    }
}
