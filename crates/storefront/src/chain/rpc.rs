//! Ethereum JSON-RPC wallet provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use chainmart_core::{TxHash, WalletAddress};

use super::provider::{
    ConnectorKind, ProviderError, TransactionReceipt, TransactionRequest, WalletProvider,
};
use super::units::{format_quantity, parse_quantity};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

/// A wallet reached through a JSON-RPC endpoint.
///
/// The endpoint must be able to sign for the buyer (a relay connector or a
/// local signer node). Public read-only RPC nodes will reject
/// `eth_sendTransaction`.
pub struct JsonRpcWallet {
    client: reqwest::Client,
    endpoint: String,
    kind: ConnectorKind,
    next_id: AtomicU64,
}

impl JsonRpcWallet {
    /// Create a provider for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(endpoint: impl Into<String>, kind: ConnectorKind) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            kind,
            next_id: AtomicU64::new(1),
        })
    }

    #[instrument(skip(self, params), fields(endpoint = %self.endpoint))]
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("HTTP {status}")));
        }

        let payload: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if let Some(error) = payload.error {
            debug!(code = error.code, message = %error.message, "JSON-RPC error");
            let chain_id = (method == "wallet_switchEthereumChain")
                .then(|| chain_id_param(&body.params))
                .flatten();
            return Err(ProviderError::from_rpc(error.code, error.message, chain_id));
        }

        Ok(payload.result)
    }

    async fn request_quantity(&self, method: &str, params: Value) -> Result<U256, ProviderError> {
        let value = self.request(method, params).await?;
        let quantity = value
            .as_str()
            .ok_or_else(|| ProviderError::Malformed(format!("{method}: expected hex string")))?;
        parse_quantity(quantity).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn chain_id_param(params: &Value) -> Option<u64> {
    let hex = params.get(0)?.get("chainId")?.as_str()?;
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

fn to_u64(value: U256, what: &str) -> Result<u64, ProviderError> {
    if value.bits() > 64 {
        return Err(ProviderError::Malformed(format!("{what} out of range")));
    }
    Ok(value.low_u64())
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError> {
        let value = self.request("eth_accounts", json!([])).await?;
        let raw: Vec<String> =
            serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        raw.iter()
            .map(|address| {
                WalletAddress::parse(address).map_err(|e| ProviderError::Malformed(e.to_string()))
            })
            .collect()
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.request_quantity("eth_chainId", json!([])).await?;
        to_u64(value, "chain id")
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": format!("{chain_id:#x}") }]),
        )
        .await
        .map(|_| ())
    }

    async fn native_balance(&self, address: &WalletAddress) -> Result<U256, ProviderError> {
        self.request_quantity("eth_getBalance", json!([address.as_str(), "latest"]))
            .await
    }

    async fn call(&self, to: &WalletAddress, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let value = self
            .request(
                "eth_call",
                json!([{ "to": to.as_str(), "data": hex_data(data) }, "latest"]),
            )
            .await?;
        let output = value
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("eth_call: expected hex string".to_owned()))?;
        hex::decode(output.trim_start_matches("0x"))
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TxHash, ProviderError> {
        let mut tx = json!({
            "from": request.from.as_str(),
            "to": request.to.as_str(),
            "value": format_quantity(request.value),
        });
        if !request.data.is_empty() {
            tx["data"] = Value::String(hex_data(&request.data));
        }

        let value = self.request("eth_sendTransaction", json!([tx])).await?;
        let hash = value.as_str().ok_or_else(|| {
            ProviderError::Malformed("eth_sendTransaction: expected hash".to_owned())
        })?;
        TxHash::parse(hash).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let value = self
            .request("eth_getTransactionReceipt", json!([tx_hash.as_str()]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }

        let raw: RawReceipt =
            serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        // Some nodes return a receipt shell before the block is assigned.
        let Some(block_number) = raw.block_number else {
            return Ok(None);
        };

        let block_number = parse_quantity(&block_number)
            .map_err(|e| ProviderError::Malformed(e.to_string()))
            .and_then(|n| to_u64(n, "block number"))?;
        let succeeded = raw.status.as_deref() != Some("0x0");

        Ok(Some(TransactionReceipt {
            tx_hash: TxHash::parse(&raw.transaction_hash)
                .map_err(|e| ProviderError::Malformed(e.to_string()))?,
            block_number,
            succeeded,
        }))
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let value = self.request_quantity("eth_blockNumber", json!([])).await?;
        to_u64(value, "block number")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_param() {
        let params = json!([{ "chainId": "0x38" }]);
        assert_eq!(chain_id_param(&params), Some(56));
        assert_eq!(chain_id_param(&json!([])), None);
    }

    #[test]
    fn test_hex_data() {
        assert_eq!(hex_data(&[0xa9, 0x05]), "0xa905");
        assert_eq!(hex_data(&[]), "0x");
    }

    #[test]
    fn test_to_u64_range() {
        assert_eq!(to_u64(U256::from(56_u8), "chain id").unwrap(), 56);
        assert!(to_u64(U256::exp10(30), "chain id").is_err());
    }

    #[test]
    fn test_rpc_response_error_parses() {
        let payload: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected"}}"#,
        )
        .unwrap();
        assert!(payload.result.is_null());
        assert_eq!(payload.error.unwrap().code, 4001);
    }

    #[test]
    fn test_receipt_shape() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x1",
        }))
        .unwrap();
        assert_eq!(raw.block_number.as_deref(), Some("0x10"));
        assert_eq!(raw.status.as_deref(), Some("0x1"));
    }
}
