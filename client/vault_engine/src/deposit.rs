//! Deposit step of the donation flow.
//!
//! Preconditions are checked in a fixed order and the first failure wins:
//!
//! 1. no other deposit from this controller is in flight
//! 2. a wallet is connected
//! 3. a vault is selected and its token is recognised
//! 4. the amount is positive
//! 5. the amount is covered by the wallet's token balance, read at call time
//! 6. the allowance controller reports `Sufficient` for this exact triple
//!
//! A failed precondition performs no ledger write.

use tracing::{info, warn};

use crate::action::{ActionSlot, ActionStatus};
use crate::allowance::{AllowanceController, AllowanceState};
use crate::amount;
use crate::errors::{EngineError, Field, Result};
use crate::ledger::{Confirmation, Ledger};
use crate::session::{DonationContext, SelectedVault};
use crate::types::{Address, BaseUnits, StablecoinDescriptor};

#[derive(Debug, Default)]
pub struct DepositController {
    action: ActionSlot,
}

impl DepositController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ActionStatus {
        self.action.status()
    }

    /// Gates the deposit action; set from the first precondition check until
    /// the ledger answers.
    pub fn is_in_flight(&self) -> bool {
        self.action.is_in_flight()
    }

    pub async fn deposit(
        &self,
        ledger: &dyn Ledger,
        ctx: &DonationContext,
        allowance: &AllowanceController,
    ) -> Result<Confirmation> {
        let _guard = self.action.begin()?;
        let (wallet, vault, token, requested) = match preconditions(ledger, ctx, allowance).await {
            Ok(checked) => checked,
            Err(err) => {
                self.action.reset();
                return Err(err);
            }
        };

        self.action.set_pending();
        info!(
            "Depositing {} into vault {} from {}",
            amount::display(requested, token),
            vault.address,
            wallet
        );
        match ledger
            .deposit(vault.address, wallet, token.address, requested)
            .await
        {
            Ok(confirmation) => {
                self.action.succeed(&confirmation);
                Ok(confirmation)
            }
            Err(err) => {
                let err = match err {
                    EngineError::LedgerWrite(_) => err,
                    other => EngineError::LedgerWrite(other.to_string()),
                };
                warn!("Deposit into {} failed: {err}", vault.address);
                self.action.fail(&err);
                Err(err)
            }
        }
    }
}

async fn preconditions<'c>(
    ledger: &dyn Ledger,
    ctx: &'c DonationContext,
    allowance: &AllowanceController,
) -> Result<(Address, &'c SelectedVault, &'c StablecoinDescriptor, BaseUnits)> {
    let wallet = ctx.wallet.ok_or_else(|| EngineError::missing(Field::Wallet))?;
    let vault = ctx.vault.as_ref().ok_or_else(|| EngineError::missing(Field::Vault))?;
    let token = vault.token.as_ref().ok_or_else(|| EngineError::missing(Field::Token))?;
    let requested = match ctx.amount {
        None => return Err(EngineError::missing(Field::Amount)),
        Some(0) => {
            return Err(EngineError::InvalidAmount {
                field: Field::Amount,
                source: amount::AmountError::NonPositive,
            })
        }
        Some(units) => units,
    };

    let balance = ledger.balance_of(token.address, wallet).await?;
    if requested > balance {
        return Err(EngineError::InsufficientBalance {
            requested: amount::display(requested, token),
            available: amount::display(balance, token),
        });
    }

    let key_matches = ctx.allowance_key() == allowance.key();
    if !key_matches || allowance.state() != AllowanceState::Sufficient {
        return Err(EngineError::AllowanceInsufficient);
    }
    Ok((wallet, vault, token, requested))
}
