//! The donation form: connected wallet, selected vault, entered amount, and
//! the two controllers that act on them.
//!
//! Every change to the wallet, the vault or the amount synchronously
//! retargets the [`AllowanceController`], so the approval state shown next to
//! the form always matches the current inputs.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::action::ActionStatus;
use crate::allowance::{AllowanceController, AllowanceKey, AllowanceState, ApprovalPolicy, Requery};
use crate::amount;
use crate::deposit::DepositController;
use crate::errors::{EngineError, Field, Result};
use crate::ledger::{Confirmation, Ledger};
use crate::registry::NetworkView;
use crate::types::{Address, BaseUnits, FieldErrors, StablecoinDescriptor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowSettings {
    pub approval_policy: ApprovalPolicy,
    pub requery: Requery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedVault {
    pub address: Address,
    pub token_address: Address,
    /// `None` when the vault's token is not recognised on this network.
    pub token: Option<StablecoinDescriptor>,
}

/// A point-in-time copy of the form inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DonationContext {
    pub wallet: Option<Address>,
    pub vault: Option<SelectedVault>,
    pub amount_input: String,
    /// Parsed with the selected token's precision; `None` until valid.
    pub amount: Option<BaseUnits>,
}

impl DonationContext {
    pub fn token(&self) -> Option<&StablecoinDescriptor> {
        self.vault.as_ref().and_then(|v| v.token.as_ref())
    }

    pub fn allowance_key(&self) -> Option<AllowanceKey> {
        let vault = self.vault.as_ref()?;
        Some(AllowanceKey {
            owner: self.wallet?,
            spender: vault.address,
            token: vault.token.as_ref()?.address,
        })
    }

    /// Everything `approve` needs, or the first missing piece.
    pub fn require_approval(&self) -> Result<(AllowanceKey, BaseUnits)> {
        let owner = self.wallet.ok_or_else(|| EngineError::missing(Field::Wallet))?;
        let vault = self.vault.as_ref().ok_or_else(|| EngineError::missing(Field::Vault))?;
        let requested = self
            .amount
            .filter(|units| *units > 0)
            .ok_or_else(|| EngineError::missing(Field::Amount))?;
        let token = vault.token.as_ref().ok_or_else(|| EngineError::missing(Field::Token))?;
        Ok((
            AllowanceKey {
                owner,
                spender: vault.address,
                token: token.address,
            },
            requested,
        ))
    }

    fn reset_selection(&mut self) {
        self.vault = None;
        self.amount = None;
        self.amount_input.clear();
    }
}

fn parse_amount(input: &str, token: Option<&StablecoinDescriptor>) -> Result<Option<BaseUnits>> {
    let Some(token) = token else {
        return Ok(None);
    };
    if input.is_empty() {
        return Ok(None);
    }
    amount::to_positive_base_units(input, token.decimals)
        .map(Some)
        .map_err(|source| EngineError::InvalidAmount {
            field: Field::Amount,
            source,
        })
}

/// What the presentation layer renders next to the donation form.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub context: DonationContext,
    pub amount_display: Option<String>,
    pub allowance: AllowanceState,
    /// Messages from the last rejected input or submission, by field.
    pub errors: FieldErrors,
    pub approve: ActionStatus,
    pub deposit: ActionStatus,
    pub can_approve: bool,
    pub can_deposit: bool,
}

pub struct DonationSession {
    ledger: Arc<dyn Ledger>,
    network: NetworkView,
    settings: FlowSettings,
    context: Mutex<DonationContext>,
    errors: Mutex<FieldErrors>,
    allowance: AllowanceController,
    deposit: DepositController,
}

impl DonationSession {
    pub fn new(ledger: Arc<dyn Ledger>, network: NetworkView, settings: FlowSettings) -> Self {
        Self {
            ledger,
            network,
            settings,
            context: Mutex::new(DonationContext::default()),
            errors: Mutex::new(FieldErrors::new()),
            allowance: AllowanceController::new(),
            deposit: DepositController::new(),
        }
    }

    pub fn network(&self) -> &NetworkView {
        &self.network
    }

    pub fn context(&self) -> DonationContext {
        self.context.lock().clone()
    }

    pub fn allowance(&self) -> &AllowanceController {
        &self.allowance
    }

    pub fn deposits(&self) -> &DepositController {
        &self.deposit
    }

    pub fn allowance_state(&self) -> AllowanceState {
        self.allowance.state()
    }

    pub fn errors(&self) -> FieldErrors {
        self.errors.lock().clone()
    }

    /// Replace the `amount` entry with the outcome of the latest parse.
    fn record_amount(&self, parsed: &Result<Option<BaseUnits>>) {
        let mut errors = self.errors.lock();
        errors.remove(Field::Amount);
        if let Err(err) = parsed {
            errors.record(err);
        }
    }

    fn note<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.errors.lock().record(err);
        }
        result
    }

    pub fn connect_wallet(&self, wallet: Option<Address>) -> AllowanceState {
        let mut ctx = self.context.lock();
        ctx.wallet = wallet;
        self.allowance.retarget(ctx.allowance_key(), ctx.amount)
    }

    /// Select `vault`, whose token is `token`. A previously typed amount is
    /// re-parsed with the new token's precision; a failure is kept in the
    /// `amount` field error.
    pub fn select_vault(&self, vault: Address, token: Address) -> AllowanceState {
        let descriptor = self.network.find(token).cloned();
        if descriptor.is_none() {
            debug!("Vault {vault} uses token {token}, not recognised on {}", self.network.network);
        }
        let mut ctx = self.context.lock();
        ctx.vault = Some(SelectedVault {
            address: vault,
            token_address: token,
            token: descriptor,
        });
        let parsed = parse_amount(&ctx.amount_input, ctx.token());
        ctx.amount = parsed.as_ref().ok().copied().flatten();
        let state = self.allowance.retarget(ctx.allowance_key(), ctx.amount);
        drop(ctx);
        self.record_amount(&parsed);
        state
    }

    pub fn clear_vault(&self) -> AllowanceState {
        let mut ctx = self.context.lock();
        ctx.vault = None;
        ctx.amount = None;
        self.allowance.retarget(None, None)
    }

    /// Update the donation amount. Unparsable or non-positive input clears
    /// the parsed amount and returns `InvalidAmount` keyed to `amount`.
    pub fn set_amount(&self, input: &str) -> Result<AllowanceState> {
        let mut ctx = self.context.lock();
        ctx.amount_input = input.trim().to_string();
        let parsed = parse_amount(&ctx.amount_input, ctx.token());
        ctx.amount = parsed.as_ref().ok().copied().flatten();
        let state = self.allowance.retarget(ctx.allowance_key(), ctx.amount);
        drop(ctx);
        self.record_amount(&parsed);
        parsed.map(|_| state)
    }

    pub async fn refresh_allowance(&self) -> Result<AllowanceState> {
        self.allowance.refresh(self.ledger.as_ref()).await
    }

    pub async fn approve(&self) -> Result<Confirmation> {
        self.errors.lock().clear();
        let (key, requested) = self.note(self.context().require_approval())?;
        let result = self
            .allowance
            .approve(
                self.ledger.as_ref(),
                key,
                requested,
                self.settings.approval_policy,
                self.settings.requery,
            )
            .await;
        self.note(result)
    }

    /// Deposit the current amount into the selected vault. On confirmation
    /// the vault selection and amount are cleared.
    pub async fn deposit(&self) -> Result<Confirmation> {
        self.errors.lock().clear();
        let ctx = self.context();
        let result = self
            .deposit
            .deposit(self.ledger.as_ref(), &ctx, &self.allowance)
            .await;
        let confirmation = self.note(result)?;

        let mut current = self.context.lock();
        current.reset_selection();
        self.allowance.retarget(None, None);
        info!("Donation confirmed in {}; form reset", confirmation.tx_hash);
        Ok(confirmation)
    }

    pub fn view(&self) -> SessionView {
        let context = self.context();
        let allowance = self.allowance.state();
        let amount_display = context
            .amount
            .zip(context.token())
            .map(|(units, token)| amount::display(units, token));
        SessionView {
            amount_display,
            allowance,
            errors: self.errors(),
            approve: self.allowance.action_status(),
            deposit: self.deposit.status(),
            can_approve: allowance == AllowanceState::Insufficient
                && context.require_approval().is_ok()
                && !self.allowance.is_in_flight(),
            can_deposit: allowance == AllowanceState::Sufficient && !self.deposit.is_in_flight(),
            context,
        }
    }
}
