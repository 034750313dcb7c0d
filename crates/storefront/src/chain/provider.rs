//! Wallet provider seam.
//!
//! A [`WalletProvider`] is whatever can sign and broadcast for the buyer: an
//! injected browser-style wallet, or a relay connector reached over
//! JSON-RPC. The gateway never talks to the chain any other way.

use async_trait::async_trait;
use primitive_types::U256;
use thiserror::Error;

use chainmart_core::{TxHash, WalletAddress};

/// JSON-RPC error code for a request the user declined.
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC error code for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// How the wallet was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// A wallet already present in the client environment.
    Injected,
    /// A QR / modal relay connector.
    Relay,
}

/// Errors surfaced by a wallet provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Chain {0} is not configured in the wallet")]
    UnrecognizedChain(u64),

    #[error("Wallet error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Wallet unreachable: {0}")]
    Transport(String),

    #[error("Malformed wallet response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Map a JSON-RPC error object onto the provider taxonomy.
    #[must_use]
    pub fn from_rpc(code: i64, message: String, chain_id: Option<u64>) -> Self {
        match (code, chain_id) {
            (USER_REJECTED_CODE, _) => Self::UserRejected,
            (UNRECOGNIZED_CHAIN_CODE, Some(chain_id)) => Self::UnrecognizedChain(chain_id),
            _ => Self::Rpc { code, message },
        }
    }
}

/// A value transfer or contract call to sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: WalletAddress,
    pub to: WalletAddress,
    /// Native value in base units.
    pub value: U256,
    /// Contract calldata; empty for plain transfers.
    pub data: Vec<u8>,
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub succeeded: bool,
}

/// Signing and chain access for one buyer wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// How this provider was reached.
    fn kind(&self) -> ConnectorKind;

    /// Request account access. The first address is the active account.
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to change its active chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Native coin balance in base units.
    async fn native_balance(&self, address: &WalletAddress) -> Result<U256, ProviderError>;

    /// Read-only contract call; returns the raw ABI output.
    async fn call(&self, to: &WalletAddress, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Sign and broadcast. Resolves with the hash as soon as the wallet
    /// accepts the transaction.
    async fn send_transaction(&self, request: TransactionRequest)
    -> Result<TxHash, ProviderError>;

    /// `None` while the transaction is still pending.
    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;

    async fn block_number(&self) -> Result<u64, ProviderError>;
}
