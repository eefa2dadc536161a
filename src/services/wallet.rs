// services/wallet.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

// JSON-RPC wire structs
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletFault {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    #[error("user rejected the request")]
    UserRejected,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAccount {
    pub address: String,
    pub chain_id: u64,
}

/// Thin capability wrapper over an external wallet provider. Carries no
/// settlement logic of its own; all amounts are denominated in wei.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(&self) -> Result<WalletAccount, WalletFault>;
    async fn disconnect(&self) -> Result<(), WalletFault>;
    async fn get_balance(&self, address: &str) -> Result<u128, WalletFault>;
    async fn send(&self, to: &str, amount_wei: u128) -> Result<String, WalletFault>;
}

pub struct JsonRpcWallet {
    client: Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl JsonRpcWallet {
    // No request timeout here: a wallet-mediated call may legitimately
    // wait on user interaction before resolving.
    pub fn new(rpc_url: String) -> Self {
        JsonRpcWallet {
            client: Client::new(),
            rpc_url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, WalletFault> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletFault::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("RPC {} failed: {} - {}", method, status, body);
            return Err(WalletFault::Network(format!("provider returned {}", status)));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| WalletFault::Network(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(map_rpc_error(err));
        }

        body.result
            .ok_or_else(|| WalletFault::Network("empty RPC response".to_string()))
    }

    async fn first_account(&self) -> Result<String, WalletFault> {
        let result = self.rpc("eth_accounts", json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(result)
            .map_err(|e| WalletFault::Network(format!("malformed accounts response: {}", e)))?;

        accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletFault::Unavailable("no accounts exposed by the provider".to_string()))
    }
}

#[async_trait]
impl WalletConnector for JsonRpcWallet {
    async fn connect(&self) -> Result<WalletAccount, WalletFault> {
        let address = self.first_account().await?;

        let result = self.rpc("eth_chainId", json!([])).await?;
        let chain_hex = result
            .as_str()
            .ok_or_else(|| WalletFault::Network("malformed chain id response".to_string()))?;
        let chain_id = parse_quantity(chain_hex)? as u64;

        info!("Wallet connected: {} (chain {})", address, chain_id);
        Ok(WalletAccount { address, chain_id })
    }

    // The provider holds no per-caller connection state, nothing to tear down.
    async fn disconnect(&self) -> Result<(), WalletFault> {
        Ok(())
    }

    async fn get_balance(&self, address: &str) -> Result<u128, WalletFault> {
        let result = self.rpc("eth_getBalance", json!([address, "latest"])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| WalletFault::Network("malformed balance response".to_string()))?;
        parse_quantity(hex)
    }

    async fn send(&self, to: &str, amount_wei: u128) -> Result<String, WalletFault> {
        let from = self.first_account().await?;
        let params = json!([{
            "from": from,
            "to": to,
            "value": format!("0x{:x}", amount_wei),
        }]);

        let result = self.rpc("eth_sendTransaction", params).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| WalletFault::Network("malformed transaction response".to_string()))?;

        info!("Transaction submitted: {}", hash);
        Ok(hash.to_string())
    }
}

fn map_rpc_error(err: JsonRpcErrorBody) -> WalletFault {
    // EIP-1193 user-rejection code
    if err.code == 4001 {
        return WalletFault::UserRejected;
    }
    if err.message.to_lowercase().contains("insufficient funds") {
        return WalletFault::InsufficientFunds;
    }
    WalletFault::Rejected(err.message)
}

/// Parses a hex quantity of the `0x1b3` form used by the RPC interface.
pub fn parse_quantity(hex: &str) -> Result<u128, WalletFault> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| WalletFault::Network(format!("quantity missing 0x prefix: {}", hex)))?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| WalletFault::Network(format!("bad hex quantity {}: {}", hex, e)))
}

/// Converts an ETH amount to wei, rounding to six decimal places first so
/// the conversion itself is exact integer arithmetic.
pub fn eth_to_wei(eth: f64) -> u128 {
    let micro_eth = (eth * 1_000_000.0).round() as u128;
    micro_eth * (WEI_PER_ETH / 1_000_000)
}

pub fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETH as f64
}

/// Address check used before handing anything to the provider: 0x prefix
/// plus forty hex digits. Checksum casing is not enforced.
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(rest) => rest.len() == 40 && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
