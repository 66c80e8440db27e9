//! Ethereum JSON-RPC implementation of [`Ledger`].
//!
//! ## Resilience
//!
//! * Reads (`eth_call`, `eth_chainId`, receipt polls) back off exponentially
//!   on transport errors, rate limits and soft RPC errors, up to
//!   [`MAX_BACKOFF_SECS`] seconds and [`MAX_READ_ATTEMPTS`] attempts.
//! * Writes (`eth_sendTransaction`) are never retried: a failed submission is
//!   terminal for that attempt and surfaces as `LedgerWrite`.
//! * Submitted transactions are polled via `eth_getTransactionReceipt` until
//!   confirmed, reverted, or the confirmation timeout elapses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::abi::{self, Token};
use super::signatures as sig;
use super::{ApprovalAmount, Confirmation, Ledger};
use crate::config::Config;
use crate::errors::{EngineError, Result};
use crate::types::{Address, BaseUnits, NetworkId, VaultName};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_READ_ATTEMPTS: u32 = 4;

/// JSON-RPC error codes that retrying cannot fix (reverts, bad requests).
const HARD_ERROR_CODES: &[i64] = &[3, -32600, -32601, -32602];

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RawReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    pub status: Option<String>,
}

enum Failure {
    Retry(String),
    Fatal(String),
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct RpcLedger {
    client: Client,
    rpc_url: String,
    factory: Address,
    receipt_poll: Duration,
    confirmation_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            rpc_url: config.rpc_url.clone(),
            factory: config.factory_address,
            receipt_poll: Duration::from_millis(config.receipt_poll_ms),
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            next_id: AtomicU64::new(1),
        }
    }

    /// Read-only contract call: `read(contract, function, args)`.
    pub async fn call(&self, contract: Address, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let params = build_call_params(contract, &abi::encode_call(signature, args));
        let result = self.request_with_backoff("eth_call", params).await?;
        let data = result
            .as_str()
            .ok_or_else(|| EngineError::LedgerRead(format!("{signature}: non-string result")))?;
        abi::from_hex_data(data)
    }

    /// Ledger-mutating call: `write(contract, function, args)`. Resolves once
    /// the transaction is confirmed.
    pub async fn send(
        &self,
        from: Address,
        contract: Address,
        signature: &str,
        args: &[Token],
    ) -> Result<Confirmation> {
        let params = build_send_params(from, contract, &abi::encode_call(signature, args));
        let tx_hash = match self.request_once("eth_sendTransaction", params).await {
            Ok(Value::String(hash)) => hash,
            Ok(other) => {
                return Err(EngineError::LedgerWrite(format!(
                    "{signature}: unexpected submission result {other}"
                )))
            }
            Err(Failure::Retry(msg)) | Err(Failure::Fatal(msg)) => {
                return Err(EngineError::LedgerWrite(format!("{signature}: {msg}")))
            }
        };
        info!("Submitted {signature} to {contract}: {tx_hash}");
        self.wait_for_receipt(&tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Confirmation> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            let result = self
                .request_with_backoff("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .map_err(|e| EngineError::LedgerWrite(format!("receipt for {tx_hash}: {e}")))?;

            if !result.is_null() {
                let receipt: RawReceipt = serde_json::from_value(result)?;
                if let Some(confirmation) = parse_receipt(&receipt)? {
                    info!(
                        "Confirmed {} in block {}",
                        confirmation.tx_hash, confirmation.block_number
                    );
                    return Ok(confirmation);
                }
            }

            if Instant::now() >= deadline {
                return Err(EngineError::LedgerWrite(format!(
                    "{tx_hash} not confirmed within {}s",
                    self.confirmation_timeout.as_secs()
                )));
            }
            debug!("Receipt for {tx_hash} pending");
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    async fn request_with_backoff(&self, method: &str, params: Value) -> Result<Value> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;
        loop {
            match self.request_once(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(Failure::Fatal(msg)) => return Err(EngineError::LedgerRead(msg)),
                Err(Failure::Retry(msg)) if attempt >= MAX_READ_ATTEMPTS => {
                    return Err(EngineError::LedgerRead(format!(
                        "{method} failed after {attempt} attempts: {msg}"
                    )))
                }
                Err(Failure::Retry(msg)) => {
                    warn!("{method} failed (will retry in {backoff}s): {msg}");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    attempt += 1;
                }
            }
        }
    }

    async fn request_once(&self, method: &str, params: Value) -> std::result::Result<Value, Failure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| Failure::Retry(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Retry("rate-limited".to_string()));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Failure::Fatal(format!("malformed response: {e}")))?;
        classify(body)
    }

    async fn call_uint(&self, contract: Address, signature: &str, args: &[Token]) -> Result<BaseUnits> {
        abi::decode_uint(&self.call(contract, signature, args).await?)
    }

    async fn call_address(&self, contract: Address, signature: &str) -> Result<Address> {
        abi::decode_address(&self.call(contract, signature, &[]).await?)
    }
}

fn classify(body: RpcResponse) -> std::result::Result<Value, Failure> {
    if let Some(err) = body.error {
        let msg = format!("RPC error {}: {}", err.code, err.message);
        return if HARD_ERROR_CODES.contains(&err.code) {
            Err(Failure::Fatal(msg))
        } else {
            Err(Failure::Retry(msg))
        };
    }
    // A null result is meaningful (e.g. a receipt that is not yet available).
    Ok(body.result.unwrap_or(Value::Null))
}

fn build_call_params(contract: Address, data: &[u8]) -> Value {
    json!([
        { "to": contract.to_string(), "data": abi::to_hex_data(data) },
        "latest"
    ])
}

fn build_send_params(from: Address, contract: Address, data: &[u8]) -> Value {
    json!([{
        "from": from.to_string(),
        "to": contract.to_string(),
        "data": abi::to_hex_data(data),
    }])
}

/// `Ok(None)` while the receipt has no block yet; `Err` when reverted.
fn parse_receipt(receipt: &RawReceipt) -> Result<Option<Confirmation>> {
    let Some(block) = receipt.block_number.as_deref() else {
        return Ok(None);
    };
    if receipt.status.as_deref() == Some("0x0") {
        return Err(EngineError::LedgerWrite(format!(
            "transaction {} reverted",
            receipt.transaction_hash
        )));
    }
    Ok(Some(Confirmation {
        tx_hash: receipt.transaction_hash.clone(),
        block_number: parse_quantity(block)?,
    }))
}

fn parse_quantity(raw: &str) -> Result<u64> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|e| EngineError::LedgerRead(format!("bad quantity '{raw}': {e}")))
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> Result<NetworkId> {
        let result = self.request_with_backoff("eth_chainId", json!([])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| EngineError::LedgerRead("eth_chainId: non-string result".to_string()))?;
        parse_quantity(raw).map(NetworkId)
    }

    async fn list_vaults_by_beneficiary(&self, beneficiary: Address) -> Result<Vec<Address>> {
        let data = self
            .call(self.factory, sig::VAULTS_BY_BENEFICIARY, &[beneficiary.into()])
            .await?;
        abi::decode_address_array(&data)
    }

    async fn list_all_vaults(&self) -> Result<Vec<Address>> {
        abi::decode_address_array(&self.call(self.factory, sig::ALL_VAULTS, &[]).await?)
    }

    async fn create_vault(
        &self,
        from: Address,
        name: VaultName,
        beneficiary: Address,
        token: Address,
        target: BaseUnits,
    ) -> Result<Confirmation> {
        let args = [name.into(), beneficiary.into(), token.into(), Token::Uint(target)];
        self.send(from, self.factory, sig::CREATE_VAULT, &args).await
    }

    async fn vault_name(&self, vault: Address) -> Result<VaultName> {
        let data = self.call(vault, sig::VAULT_NAME, &[]).await?;
        abi::decode_bytes32(&data).map(VaultName::from_bytes)
    }

    async fn vault_beneficiary(&self, vault: Address) -> Result<Address> {
        self.call_address(vault, sig::VAULT_BENEFICIARY).await
    }

    async fn vault_target(&self, vault: Address) -> Result<BaseUnits> {
        self.call_uint(vault, sig::VAULT_TARGET, &[]).await
    }

    async fn vault_token(&self, vault: Address) -> Result<Address> {
        self.call_address(vault, sig::VAULT_TOKEN).await
    }

    async fn deposit(
        &self,
        vault: Address,
        depositor: Address,
        token: Address,
        amount: BaseUnits,
    ) -> Result<Confirmation> {
        let args = [depositor.into(), token.into(), Token::Uint(amount)];
        self.send(depositor, vault, sig::VAULT_DEPOSIT, &args).await
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<BaseUnits> {
        self.call_uint(token, sig::BALANCE_OF, &[account.into()]).await
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<BaseUnits> {
        self.call_uint(token, sig::ALLOWANCE, &[owner.into(), spender.into()])
            .await
    }

    async fn approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: ApprovalAmount,
    ) -> Result<Confirmation> {
        let value = match amount {
            ApprovalAmount::Unlimited => Token::UintMax,
            ApprovalAmount::Exact(units) => Token::Uint(units),
        };
        self.send(owner, token, sig::APPROVE, &[spender.into(), value])
            .await
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
