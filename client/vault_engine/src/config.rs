//! Engine configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::allowance::{ApprovalPolicy, Requery};
use crate::errors::{EngineError, Result};
use crate::session::FlowSettings;
use crate::types::{Address, NetworkId};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint of the ledger (e.g. http://127.0.0.1:8545)
    pub rpc_url: String,
    /// Vault registry (factory) contract address
    pub factory_address: Address,
    /// Network shown when no wallet is connected
    pub target_chain_id: NetworkId,
    /// Connected wallet, if any
    pub wallet_address: Option<Address>,
    /// Network the wallet reports; defaults to the RPC's own chain id
    pub wallet_chain_id: Option<NetworkId>,
    /// Deployed mock stablecoin on local networks
    pub mock_token_address: Option<Address>,
    /// Interval between receipt polls after a write is submitted
    pub receipt_poll_ms: u64,
    /// How long to wait for a write to be confirmed
    pub confirmation_timeout_secs: u64,
    /// Allowance re-queries after an approval confirms
    pub allowance_requery_attempts: u32,
    /// Delay between those re-queries
    pub allowance_requery_delay_ms: u64,
    pub approval_policy: ApprovalPolicy,
    /// How long the vault list waits for slow fields before printing them
    /// as pending
    pub listing_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            factory_address: env_var("FACTORY_ADDRESS")
                .map_err(|_| {
                    EngineError::Config("FACTORY_ADDRESS environment variable is required".to_string())
                })?
                .parse()
                .map_err(|_| EngineError::Config("Invalid FACTORY_ADDRESS".to_string()))?,
            target_chain_id: NetworkId(parse_or("TARGET_CHAIN_ID", "31337")?),
            wallet_address: optional_address("WALLET_ADDRESS")?,
            wallet_chain_id: optional("WALLET_CHAIN_ID")?.map(NetworkId),
            mock_token_address: optional_address("MOCK_TOKEN_ADDRESS")?,
            receipt_poll_ms: parse_or("RECEIPT_POLL_MS", "1000")?,
            confirmation_timeout_secs: parse_or("CONFIRMATION_TIMEOUT_SECS", "120")?,
            allowance_requery_attempts: parse_or("ALLOWANCE_REQUERY_ATTEMPTS", "5")?,
            allowance_requery_delay_ms: parse_or("ALLOWANCE_REQUERY_DELAY_MS", "500")?,
            approval_policy: parse_policy(
                &env_var("APPROVAL_POLICY").unwrap_or_else(|_| "unlimited".to_string()),
            )?,
            listing_timeout_secs: parse_or("LISTING_TIMEOUT_SECS", "30")?,
        })
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            approval_policy: self.approval_policy,
            requery: Requery {
                attempts: self.allowance_requery_attempts,
                delay: Duration::from_millis(self.allowance_requery_delay_ms),
            },
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| EngineError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| EngineError::Config(format!("Invalid {key}")))
}

fn optional<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("Invalid {key}"))),
        _ => Ok(None),
    }
}

fn optional_address(key: &str) -> Result<Option<Address>> {
    optional::<Address>(key)
}

fn parse_policy(raw: &str) -> Result<ApprovalPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "unlimited" => Ok(ApprovalPolicy::Unlimited),
        "exact" => Ok(ApprovalPolicy::Exact),
        other => Err(EngineError::Config(format!(
            "Invalid APPROVAL_POLICY '{other}' (expected unlimited or exact)"
        ))),
    }
}
