//! In-process [`Ledger`] with ERC-20-style token accounting, a vault
//! registry and vault deposits.
//!
//! Used by the flow tests and for running the engine without a node. It can
//! also simulate the awkward parts of a real ledger: per-vault read failures,
//! reads that hang until released, rejected writes, write latency, and
//! allowance updates that only become visible after a few queries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{ApprovalAmount, Confirmation, Ledger};
use crate::errors::{EngineError, Result};
use crate::types::{Address, BaseUnits, NetworkId, VaultName};

#[derive(Debug, Clone)]
struct VaultRecord {
    address: Address,
    name: VaultName,
    beneficiary: Address,
    token: Address,
    target: BaseUnits,
}

/// An allowance write that queries do not observe yet.
#[derive(Debug, Clone, Copy)]
struct HiddenAllowance {
    visible: BaseUnits,
    reads_left: u32,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<(Address, Address), BaseUnits>,
    allowances: HashMap<(Address, Address, Address), BaseUnits>,
    hidden: HashMap<(Address, Address, Address), HiddenAllowance>,
    vaults: Vec<VaultRecord>,
    failing_vaults: HashSet<Address>,
    reject_next_write: Option<String>,
    allowance_lag_reads: u32,
    next_vault: u64,
    block: u64,
    writes: usize,
}

/// A vault attribute read that can be held back with [`MemoryLedger::hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaultAttribute {
    Name,
    Beneficiary,
    Target,
    Token,
}

pub struct MemoryLedger {
    chain_id: NetworkId,
    write_latency: Mutex<Duration>,
    held: Mutex<HashMap<(Address, VaultAttribute), Arc<Notify>>>,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(chain_id: NetworkId) -> Self {
        Self {
            chain_id,
            write_latency: Mutex::new(Duration::ZERO),
            held: Mutex::new(HashMap::new()),
            state: Mutex::new(State::default()),
        }
    }

    // ── Fixtures ─────────────────────────────────────────────────

    pub fn mint(&self, token: Address, account: Address, amount: BaseUnits) {
        let mut state = self.state.lock();
        let balance = state.balances.entry((token, account)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: BaseUnits) {
        self.state.lock().allowances.insert((token, owner, spender), amount);
    }

    /// Register a vault without going through a write. Returns its address.
    pub fn add_vault(&self, name: &str, beneficiary: Address, token: Address, target: BaseUnits) -> Address {
        self.state
            .lock()
            .insert_vault(VaultName::encode(name), beneficiary, token, target)
    }

    // ── Fault injection ─────────────────────────────────────────

    /// Every attribute read of `vault` fails from now on.
    pub fn fail_reads_for(&self, vault: Address) {
        self.state.lock().failing_vaults.insert(vault);
    }

    /// Reads of `attribute` on `vault` wait until [`MemoryLedger::release`];
    /// never releasing simulates a stalled node.
    pub fn hold(&self, vault: Address, attribute: VaultAttribute) {
        self.held
            .lock()
            .entry((vault, attribute))
            .or_insert_with(|| Arc::new(Notify::new()));
    }

    pub fn release(&self, vault: Address, attribute: VaultAttribute) {
        if let Some(gate) = self.held.lock().remove(&(vault, attribute)) {
            gate.notify_one();
        }
    }

    /// The next write reverts with `reason`, leaving state untouched.
    pub fn reject_next_write(&self, reason: &str) {
        self.state.lock().reject_next_write = Some(reason.to_string());
    }

    /// After each approval, the next `reads` allowance queries still return
    /// the previous value.
    pub fn lag_allowance_updates(&self, reads: u32) {
        self.state.lock().allowance_lag_reads = reads;
    }

    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.lock() = latency;
    }

    // ── Inspection ──────────────────────────────────────────────

    /// Number of writes that reached the ledger (confirmed or reverted).
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn vault_count(&self) -> usize {
        self.state.lock().vaults.len()
    }

    pub fn balance(&self, token: Address, account: Address) -> BaseUnits {
        self.state.lock().balance(token, account)
    }

    async fn with_write<T>(&self, apply: impl FnOnce(&mut State) -> Result<T>) -> Result<(T, Confirmation)> {
        let latency = *self.write_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        state.writes += 1;
        if let Some(reason) = state.reject_next_write.take() {
            return Err(EngineError::LedgerWrite(format!("execution reverted: {reason}")));
        }
        let value = apply(&mut state)?;
        state.block += 1;
        let confirmation = Confirmation {
            tx_hash: format!("0x{:064x}", state.block),
            block_number: state.block,
        };
        debug!("Memory ledger confirmed {}", confirmation.tx_hash);
        Ok((value, confirmation))
    }

    async fn wait_if_held(&self, vault: Address, attribute: VaultAttribute) {
        let gate = self.held.lock().get(&(vault, attribute)).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn read_vault<T>(&self, vault: Address, pick: impl FnOnce(&VaultRecord) -> T) -> Result<T> {
        let state = self.state.lock();
        if state.failing_vaults.contains(&vault) {
            return Err(EngineError::LedgerRead(format!("call to {vault} timed out")));
        }
        state
            .vaults
            .iter()
            .find(|v| v.address == vault)
            .map(pick)
            .ok_or_else(|| EngineError::LedgerRead(format!("no contract at {vault}")))
    }
}

impl State {
    fn balance(&self, token: Address, account: Address) -> BaseUnits {
        self.balances.get(&(token, account)).copied().unwrap_or(0)
    }

    fn insert_vault(&mut self, name: VaultName, beneficiary: Address, token: Address, target: BaseUnits) -> Address {
        self.next_vault += 1;
        let mut raw = [0u8; 20];
        raw[0] = 0x7a;
        raw[12..].copy_from_slice(&self.next_vault.to_be_bytes());
        let address = Address::from_bytes(raw);
        self.vaults.push(VaultRecord {
            address,
            name,
            beneficiary,
            token,
            target,
        });
        address
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn chain_id(&self) -> Result<NetworkId> {
        Ok(self.chain_id)
    }

    async fn list_vaults_by_beneficiary(&self, beneficiary: Address) -> Result<Vec<Address>> {
        let state = self.state.lock();
        Ok(state
            .vaults
            .iter()
            .filter(|v| v.beneficiary == beneficiary)
            .map(|v| v.address)
            .collect())
    }

    async fn list_all_vaults(&self) -> Result<Vec<Address>> {
        Ok(self.state.lock().vaults.iter().map(|v| v.address).collect())
    }

    async fn create_vault(
        &self,
        _from: Address,
        name: VaultName,
        beneficiary: Address,
        token: Address,
        target: BaseUnits,
    ) -> Result<Confirmation> {
        let (_, confirmation) = self
            .with_write(|state| Ok(state.insert_vault(name, beneficiary, token, target)))
            .await?;
        Ok(confirmation)
    }

    async fn vault_name(&self, vault: Address) -> Result<VaultName> {
        self.wait_if_held(vault, VaultAttribute::Name).await;
        self.read_vault(vault, |v| v.name)
    }

    async fn vault_beneficiary(&self, vault: Address) -> Result<Address> {
        self.wait_if_held(vault, VaultAttribute::Beneficiary).await;
        self.read_vault(vault, |v| v.beneficiary)
    }

    async fn vault_target(&self, vault: Address) -> Result<BaseUnits> {
        self.wait_if_held(vault, VaultAttribute::Target).await;
        self.read_vault(vault, |v| v.target)
    }

    async fn vault_token(&self, vault: Address) -> Result<Address> {
        self.wait_if_held(vault, VaultAttribute::Token).await;
        self.read_vault(vault, |v| v.token)
    }

    async fn deposit(
        &self,
        vault: Address,
        depositor: Address,
        token: Address,
        amount: BaseUnits,
    ) -> Result<Confirmation> {
        let (_, confirmation) = self
            .with_write(|state| {
                let record = state
                    .vaults
                    .iter()
                    .find(|v| v.address == vault)
                    .ok_or_else(|| EngineError::LedgerWrite(format!("no vault at {vault}")))?;
                if record.token != token {
                    return Err(EngineError::LedgerWrite("execution reverted: wrong token".into()));
                }

                let key = (token, depositor, vault);
                let allowed = state.allowances.get(&key).copied().unwrap_or(0);
                if allowed < amount {
                    return Err(EngineError::LedgerWrite(
                        "execution reverted: insufficient allowance".into(),
                    ));
                }
                let balance = state.balance(token, depositor);
                if balance < amount {
                    return Err(EngineError::LedgerWrite(
                        "execution reverted: transfer amount exceeds balance".into(),
                    ));
                }

                if allowed != BaseUnits::MAX {
                    state.allowances.insert(key, allowed - amount);
                }
                state.balances.insert((token, depositor), balance - amount);
                let credited = state.balances.entry((token, vault)).or_default();
                *credited = credited.saturating_add(amount);
                Ok(())
            })
            .await?;
        Ok(confirmation)
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<BaseUnits> {
        Ok(self.state.lock().balance(token, account))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<BaseUnits> {
        let mut state = self.state.lock();
        let key = (token, owner, spender);
        if let Some(hidden) = state.hidden.get_mut(&key) {
            if hidden.reads_left > 0 {
                hidden.reads_left -= 1;
                return Ok(hidden.visible);
            }
            state.hidden.remove(&key);
        }
        Ok(state.allowances.get(&key).copied().unwrap_or(0))
    }

    async fn approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: ApprovalAmount,
    ) -> Result<Confirmation> {
        let units = match amount {
            ApprovalAmount::Unlimited => BaseUnits::MAX,
            ApprovalAmount::Exact(units) => units,
        };
        let (_, confirmation) = self
            .with_write(|state| {
                let key = (token, owner, spender);
                let previous = state.allowances.get(&key).copied().unwrap_or(0);
                if state.allowance_lag_reads > 0 {
                    state.hidden.insert(
                        key,
                        HiddenAllowance {
                            visible: previous,
                            reads_left: state.allowance_lag_reads,
                        },
                    );
                }
                state.allowances.insert(key, units);
                Ok(())
            })
            .await?;
        Ok(confirmation)
    }
}
