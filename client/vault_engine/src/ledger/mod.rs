//! The ledger capability consumed by the engine.
//!
//! Every read is a point-in-time query; callers re-issue reads to observe
//! updates. Every write resolves only once the ledger has confirmed it.

pub mod abi;
pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;
use crate::types::{Address, BaseUnits, NetworkId, VaultName};

/// Contract function signatures used on the vault registry, vaults and tokens.
pub mod signatures {
    pub const CREATE_VAULT: &str = "createVault(bytes32,address,address,uint256)";
    pub const VAULTS_BY_BENEFICIARY: &str = "getVaultsByBeneficiary(address)";
    pub const ALL_VAULTS: &str = "getAllVaults()";

    pub const VAULT_NAME: &str = "getName()";
    pub const VAULT_BENEFICIARY: &str = "getBeneficiary()";
    pub const VAULT_TARGET: &str = "getTargetAmount()";
    pub const VAULT_TOKEN: &str = "getStablecoin()";
    pub const VAULT_DEPOSIT: &str = "deposit(address,address,uint256)";

    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const APPROVE: &str = "approve(address,uint256)";
}

/// How much authorization an `approve` call grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAmount {
    /// `type(uint256).max`: a standing authorization.
    Unlimited,
    Exact(BaseUnits),
}

/// Proof that a write was included by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub tx_hash: String,
    pub block_number: u64,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> Result<NetworkId>;

    // ── Vault registry ───────────────────────────────────────────

    /// Vault addresses created for `beneficiary`, in creation order.
    async fn list_vaults_by_beneficiary(&self, beneficiary: Address) -> Result<Vec<Address>>;

    /// Every vault address, in creation order.
    async fn list_all_vaults(&self) -> Result<Vec<Address>>;

    async fn create_vault(
        &self,
        from: Address,
        name: VaultName,
        beneficiary: Address,
        token: Address,
        target: BaseUnits,
    ) -> Result<Confirmation>;

    // ── Vault attributes ─────────────────────────────────────────

    async fn vault_name(&self, vault: Address) -> Result<VaultName>;
    async fn vault_beneficiary(&self, vault: Address) -> Result<Address>;
    async fn vault_target(&self, vault: Address) -> Result<BaseUnits>;
    async fn vault_token(&self, vault: Address) -> Result<Address>;

    /// Pull `amount` of `token` from `depositor` into `vault`. Requires a
    /// prior allowance for the vault as spender.
    async fn deposit(
        &self,
        vault: Address,
        depositor: Address,
        token: Address,
        amount: BaseUnits,
    ) -> Result<Confirmation>;

    // ── Token ────────────────────────────────────────────────────

    async fn balance_of(&self, token: Address, account: Address) -> Result<BaseUnits>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<BaseUnits>;

    async fn approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: ApprovalAmount,
    ) -> Result<Confirmation>;
}
