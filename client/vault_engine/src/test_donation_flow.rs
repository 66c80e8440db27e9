//! End-to-end donation flow against the in-memory ledger: select a vault,
//! enter an amount, approve, deposit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::action::ActionStatus;
use crate::allowance::{AllowanceState, ApprovalPolicy, Requery};
use crate::errors::{EngineError, Field, Result};
use crate::ledger::memory::MemoryLedger;
use crate::ledger::{ApprovalAmount, Confirmation, Ledger};
use crate::registry::ChainRegistry;
use crate::session::{DonationSession, FlowSettings};
use crate::types::{Address, BaseUnits, NetworkId, VaultName};

const MOCK_USDC: Address = Address::repeat_byte(0x70);
const DONOR: Address = Address::repeat_byte(0xd0);
const BENEFICIARY: Address = Address::repeat_byte(0xbe);

const USDC: BaseUnits = 1_000_000;

fn settings(policy: ApprovalPolicy) -> FlowSettings {
    FlowSettings {
        approval_policy: policy,
        requery: Requery {
            attempts: 5,
            delay: Duration::from_millis(500),
        },
    }
}

fn session_on(ledger: Arc<dyn Ledger>, policy: ApprovalPolicy) -> DonationSession {
    let network =
        ChainRegistry::builtin().resolve(Some(NetworkId::FOUNDRY), NetworkId::FOUNDRY, Some(MOCK_USDC));
    DonationSession::new(ledger, network, settings(policy))
}

/// A funded donor and one 1000 USDC vault.
fn setup(donor_balance: BaseUnits) -> (Arc<MemoryLedger>, Address) {
    let ledger = Arc::new(MemoryLedger::new(NetworkId::FOUNDRY));
    let vault = ledger.add_vault("Food Bank", BENEFICIARY, MOCK_USDC, 1_000 * USDC);
    ledger.mint(MOCK_USDC, DONOR, donor_balance);
    (ledger, vault)
}

#[tokio::test(start_paused = true)]
async fn approve_then_deposit_resets_the_form() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("50").unwrap();
    assert_eq!(session.refresh_allowance().await.unwrap(), AllowanceState::Insufficient);
    assert!(session.view().can_approve);

    session.approve().await.unwrap();
    assert_eq!(session.allowance_state(), AllowanceState::Sufficient);
    assert_eq!(ledger.allowance(MOCK_USDC, DONOR, vault).await.unwrap(), BaseUnits::MAX);
    assert_eq!(session.view().amount_display.as_deref(), Some("50 USDC"));

    let confirmation = session.deposit().await.unwrap();
    assert!(confirmation.tx_hash.starts_with("0x"));
    assert_eq!(ledger.balance(MOCK_USDC, vault), 50 * USDC);
    assert_eq!(ledger.balance(MOCK_USDC, DONOR), 50 * USDC);

    let ctx = session.context();
    assert_eq!(ctx.wallet, Some(DONOR));
    assert_eq!(ctx.vault, None);
    assert_eq!(ctx.amount, None);
    assert!(ctx.amount_input.is_empty());
    assert_eq!(session.allowance_state(), AllowanceState::Unknown);
    assert!(matches!(session.view().deposit, ActionStatus::Succeeded { .. }));
}

#[tokio::test]
async fn deposit_over_balance_is_refused_without_a_write() {
    let (ledger, vault) = setup(50 * USDC);
    ledger.set_allowance(MOCK_USDC, DONOR, vault, BaseUnits::MAX);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("100").unwrap();
    session.refresh_allowance().await.unwrap();
    let writes = ledger.write_count();

    let err = session.deposit().await.unwrap_err();
    match err {
        EngineError::InsufficientBalance { requested, available } => {
            assert_eq!(requested, "100 USDC");
            assert_eq!(available, "50 USDC");
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert_eq!(ledger.write_count(), writes);
    assert_eq!(session.context().amount, Some(100 * USDC));
    assert_eq!(
        session.view().errors.get(Field::Amount),
        Some("Insufficient balance: requested 100 USDC, available 50 USDC")
    );
}

#[tokio::test]
async fn missing_context_is_reported_in_order() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    assert_eq!(session.deposit().await.unwrap_err().field(), Some(Field::Wallet));
    assert_eq!(session.approve().await.unwrap_err().field(), Some(Field::Wallet));

    session.connect_wallet(Some(DONOR));
    assert_eq!(session.deposit().await.unwrap_err().field(), Some(Field::Vault));

    session.select_vault(vault, MOCK_USDC);
    assert_eq!(session.deposit().await.unwrap_err().field(), Some(Field::Amount));
    assert_eq!(session.approve().await.unwrap_err().field(), Some(Field::Amount));

    session.select_vault(vault, Address::repeat_byte(0x99));
    session.set_amount("10").unwrap();
    assert_eq!(session.deposit().await.unwrap_err().field(), Some(Field::Token));

    assert_eq!(ledger.write_count(), 0);
}

#[tokio::test]
async fn deposit_before_approval_is_refused() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("10").unwrap();

    // Unknown (never queried) is not Sufficient.
    assert!(matches!(session.deposit().await, Err(EngineError::AllowanceInsufficient)));
    session.refresh_allowance().await.unwrap();
    assert!(matches!(session.deposit().await, Err(EngineError::AllowanceInsufficient)));
    assert_eq!(ledger.write_count(), 0);
}

#[tokio::test]
async fn invalid_amount_clears_parsed_value() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger, ApprovalPolicy::Unlimited);
    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);

    session.set_amount("12.5").unwrap();
    assert_eq!(session.context().amount, Some(12_500_000));

    let err = session.set_amount("1.0000001").unwrap_err();
    assert_eq!(err.field(), Some(Field::Amount));
    assert_eq!(session.context().amount, None);
    assert!(session.errors().get(Field::Amount).is_some());
    session.set_amount("2").unwrap();
    assert!(session.errors().is_empty());

    assert!(session.set_amount("0").is_err());
    assert!(session.set_amount("abc").is_err());
    assert_eq!(session.allowance_state(), AllowanceState::Unknown);
}

#[tokio::test]
async fn amount_typed_before_vault_is_parsed_on_select() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger, ApprovalPolicy::Unlimited);
    session.connect_wallet(Some(DONOR));

    session.set_amount("7").unwrap();
    assert_eq!(session.context().amount, None);
    session.select_vault(vault, MOCK_USDC);
    assert_eq!(session.context().amount, Some(7 * USDC));
}

#[tokio::test(start_paused = true)]
async fn exact_approval_tracks_amount_changes() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger.clone(), ApprovalPolicy::Exact);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("50").unwrap();
    session.approve().await.unwrap();
    assert_eq!(ledger.allowance(MOCK_USDC, DONOR, vault).await.unwrap(), 50 * USDC);
    assert_eq!(session.allowance_state(), AllowanceState::Sufficient);

    assert_eq!(session.set_amount("60").unwrap(), AllowanceState::Insufficient);
    assert_eq!(session.set_amount("40").unwrap(), AllowanceState::Sufficient);
}

#[tokio::test(start_paused = true)]
async fn lagging_allowance_is_requeried_after_approval() {
    let (ledger, vault) = setup(100 * USDC);
    ledger.lag_allowance_updates(3);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("20").unwrap();
    session.approve().await.unwrap();

    assert_eq!(session.allowance_state(), AllowanceState::Sufficient);
    session.deposit().await.unwrap();
    assert_eq!(ledger.balance(MOCK_USDC, vault), 20 * USDC);
}

#[tokio::test]
async fn rejected_approval_keeps_state_and_reports_failure() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("20").unwrap();
    session.refresh_allowance().await.unwrap();
    ledger.reject_next_write("user rejected");

    let err = session.approve().await.unwrap_err();
    assert!(matches!(err, EngineError::LedgerWrite(_)));
    assert_eq!(session.allowance_state(), AllowanceState::Insufficient);
    match session.view().approve {
        ActionStatus::Failed { reason } => assert!(reason.contains("user rejected")),
        other => panic!("expected failed approval, got {other:?}"),
    }
    assert!(!session.allowance().is_in_flight());
    assert_eq!(ledger.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_deposit_while_pending_is_rejected() {
    let (ledger, vault) = setup(100 * USDC);
    ledger.set_allowance(MOCK_USDC, DONOR, vault, BaseUnits::MAX);
    ledger.set_write_latency(Duration::from_secs(5));
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("10").unwrap();
    session.refresh_allowance().await.unwrap();

    let (first, second) = tokio::join!(session.deposit(), session.deposit());
    assert!(first.is_ok());
    assert!(matches!(second, Err(EngineError::WriteInFlight)));
    assert_eq!(ledger.write_count(), 1);
    assert_eq!(ledger.balance(MOCK_USDC, vault), 10 * USDC);
}

#[tokio::test(start_paused = true)]
async fn second_approval_while_pending_is_rejected() {
    let (ledger, vault) = setup(100 * USDC);
    ledger.set_write_latency(Duration::from_secs(5));
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("10").unwrap();

    let (first, second) = tokio::join!(session.approve(), session.approve());
    assert!(first.is_ok());
    assert!(matches!(second, Err(EngineError::WriteInFlight)));
    assert_eq!(ledger.write_count(), 1);
}

/// Holds allowance queries for one spender until released.
struct GatedLedger {
    inner: MemoryLedger,
    gated_spender: Address,
    gate: Notify,
}

#[async_trait]
impl Ledger for GatedLedger {
    async fn chain_id(&self) -> Result<NetworkId> {
        self.inner.chain_id().await
    }
    async fn list_vaults_by_beneficiary(&self, beneficiary: Address) -> Result<Vec<Address>> {
        self.inner.list_vaults_by_beneficiary(beneficiary).await
    }
    async fn list_all_vaults(&self) -> Result<Vec<Address>> {
        self.inner.list_all_vaults().await
    }
    async fn create_vault(
        &self,
        from: Address,
        name: VaultName,
        beneficiary: Address,
        token: Address,
        target: BaseUnits,
    ) -> Result<Confirmation> {
        self.inner.create_vault(from, name, beneficiary, token, target).await
    }
    async fn vault_name(&self, vault: Address) -> Result<VaultName> {
        self.inner.vault_name(vault).await
    }
    async fn vault_beneficiary(&self, vault: Address) -> Result<Address> {
        self.inner.vault_beneficiary(vault).await
    }
    async fn vault_target(&self, vault: Address) -> Result<BaseUnits> {
        self.inner.vault_target(vault).await
    }
    async fn vault_token(&self, vault: Address) -> Result<Address> {
        self.inner.vault_token(vault).await
    }
    async fn deposit(
        &self,
        vault: Address,
        depositor: Address,
        token: Address,
        amount: BaseUnits,
    ) -> Result<Confirmation> {
        self.inner.deposit(vault, depositor, token, amount).await
    }
    async fn balance_of(&self, token: Address, account: Address) -> Result<BaseUnits> {
        self.inner.balance_of(token, account).await
    }
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<BaseUnits> {
        if spender == self.gated_spender {
            self.gate.notified().await;
        }
        self.inner.allowance(token, owner, spender).await
    }
    async fn approve(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: ApprovalAmount,
    ) -> Result<Confirmation> {
        self.inner.approve(owner, token, spender, amount).await
    }
}

#[tokio::test]
async fn late_answer_for_previous_vault_is_discarded() {
    let inner = MemoryLedger::new(NetworkId::FOUNDRY);
    let vault_a = inner.add_vault("A", BENEFICIARY, MOCK_USDC, 1_000 * USDC);
    let vault_b = inner.add_vault("B", BENEFICIARY, MOCK_USDC, 1_000 * USDC);
    inner.mint(MOCK_USDC, DONOR, 100 * USDC);
    // A is fully approved, B is not; a leaked A answer would wrongly read Sufficient.
    inner.set_allowance(MOCK_USDC, DONOR, vault_a, BaseUnits::MAX);
    let ledger = Arc::new(GatedLedger {
        inner,
        gated_spender: vault_a,
        gate: Notify::new(),
    });
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault_a, MOCK_USDC);
    session.set_amount("10").unwrap();

    let stale = session.refresh_allowance();
    tokio::pin!(stale);
    assert!(futures::poll!(&mut stale).is_pending());

    session.select_vault(vault_b, MOCK_USDC);
    assert_eq!(session.refresh_allowance().await.unwrap(), AllowanceState::Insufficient);

    ledger.gate.notify_one();
    assert_eq!(stale.await.unwrap(), AllowanceState::Insufficient);
    assert_eq!(session.allowance_state(), AllowanceState::Insufficient);
    assert_eq!(session.allowance().granted(), Some(0));
    assert!(matches!(session.deposit().await, Err(EngineError::AllowanceInsufficient)));
}

#[tokio::test]
async fn amount_too_precise_for_selected_token_is_reported() {
    let (ledger, vault) = setup(100 * USDC);
    let session = session_on(ledger, ApprovalPolicy::Unlimited);
    session.connect_wallet(Some(DONOR));

    session.set_amount("1.1234567").unwrap();
    assert!(session.errors().is_empty());

    session.select_vault(vault, MOCK_USDC);
    assert_eq!(session.context().amount, None);
    let message = session.errors().get(Field::Amount).map(str::to_string);
    assert!(message.is_some_and(|m| m.starts_with("Invalid amount")));
    assert!(!session.view().can_approve);

    session.set_amount("1.5").unwrap();
    assert!(session.errors().get(Field::Amount).is_none());
}

#[tokio::test]
async fn switching_to_a_coarser_token_reparses_the_amount() {
    const DAI: Address = Address::from_hex_literal("0x6B175474E89094C44Da98b954EedeAC495271d0F");
    const MAINNET_USDC: Address = Address::from_hex_literal("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    let ledger = Arc::new(MemoryLedger::new(NetworkId::MAINNET));
    let dai_vault = ledger.add_vault("DAI drive", BENEFICIARY, DAI, 1);
    let usdc_vault = ledger.add_vault("USDC drive", BENEFICIARY, MAINNET_USDC, 1);
    let network = ChainRegistry::builtin().resolve(Some(NetworkId::MAINNET), NetworkId::MAINNET, None);
    let session = DonationSession::new(ledger, network, settings(ApprovalPolicy::Unlimited));
    session.connect_wallet(Some(DONOR));

    session.select_vault(dai_vault, DAI);
    session.set_amount("2.0000001").unwrap();
    assert_eq!(session.context().amount, Some(2_000_000_100_000_000_000));

    session.select_vault(usdc_vault, MAINNET_USDC);
    assert_eq!(session.context().amount, None);
    assert!(session.errors().get(Field::Amount).is_some());

    session.select_vault(dai_vault, DAI);
    assert_eq!(session.context().amount, Some(2_000_000_100_000_000_000));
    assert!(session.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_deposit_clears_the_previous_success() {
    let (ledger, vault) = setup(100 * USDC);
    ledger.set_allowance(MOCK_USDC, DONOR, vault, BaseUnits::MAX);
    let session = session_on(ledger.clone(), ApprovalPolicy::Unlimited);

    session.connect_wallet(Some(DONOR));
    session.select_vault(vault, MOCK_USDC);
    session.set_amount("10").unwrap();
    session.refresh_allowance().await.unwrap();
    session.deposit().await.unwrap();
    assert!(matches!(session.view().deposit, ActionStatus::Succeeded { .. }));

    // The form was reset, so the next attempt has no vault.
    let err = session.deposit().await.unwrap_err();
    assert_eq!(err.field(), Some(Field::Vault));
    let view = session.view();
    assert_eq!(view.deposit, ActionStatus::Idle);
    assert!(view.errors.get(Field::Vault).is_some());
    assert_eq!(ledger.write_count(), 1);
}
