//! Vault creation form.
//!
//! Validation runs in a fixed order and stops at the first problem, which is
//! reported against its form field. The currency must be one of the
//! stablecoins visible on the resolved network, and the target is converted
//! with that stablecoin's precision.

use serde::Serialize;
use tracing::info;

use crate::action::{ActionSlot, ActionStatus};
use crate::amount;
use crate::errors::{EngineError, Field, Result};
use crate::ledger::{Confirmation, Ledger};
use crate::registry::NetworkView;
use crate::types::{Address, AddressError, BaseUnits, VaultName};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultCreationForm {
    pub name: String,
    pub beneficiary: String,
    /// Address of the chosen stablecoin.
    pub currency: Option<Address>,
    pub target: String,
}

/// A validated `createVault` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVaultRequest {
    pub creator: Address,
    pub name: VaultName,
    pub beneficiary: Address,
    pub token: Address,
    pub target: BaseUnits,
}

impl VaultCreationForm {
    pub fn validate(&self, wallet: Option<Address>, network: &NetworkView) -> Result<CreateVaultRequest> {
        let creator = wallet.ok_or_else(|| EngineError::missing(Field::Wallet))?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(EngineError::missing(Field::Name));
        }

        let beneficiary = self.beneficiary.trim();
        if beneficiary.is_empty() {
            return Err(EngineError::missing(Field::Beneficiary));
        }
        let beneficiary: Address = beneficiary
            .parse()
            .map_err(|e: AddressError| e.for_field(Field::Beneficiary))?;

        let currency = self
            .currency
            .ok_or_else(|| EngineError::missing(Field::Currency))?;
        if !network.is_supported() {
            return Err(EngineError::InvalidInput {
                field: Field::Network,
                reason: format!("no stablecoins are available on network {}", network.network),
            });
        }
        let token = network.find(currency).ok_or_else(|| EngineError::InvalidInput {
            field: Field::Currency,
            reason: format!("{currency} is not a stablecoin on network {}", network.network),
        })?;

        let target = amount::to_positive_base_units(&self.target, token.decimals).map_err(|source| {
            EngineError::InvalidAmount {
                field: Field::Target,
                source,
            }
        })?;

        Ok(CreateVaultRequest {
            creator,
            name: VaultName::encode(name),
            beneficiary,
            token: token.address,
            target,
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
pub struct VaultCreator {
    action: ActionSlot,
}

impl VaultCreator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ActionStatus {
        self.action.status()
    }

    pub fn is_in_flight(&self) -> bool {
        self.action.is_in_flight()
    }

    /// Validate `form`, submit `createVault`, and clear the form once the
    /// ledger confirms. The caller re-lists vaults to see the new one.
    pub async fn create(
        &self,
        ledger: &dyn Ledger,
        wallet: Option<Address>,
        network: &NetworkView,
        form: &mut VaultCreationForm,
    ) -> Result<Confirmation> {
        let _guard = self.action.begin()?;
        let request = match form.validate(wallet, network) {
            Ok(request) => request,
            Err(err) => {
                self.action.reset();
                return Err(err);
            }
        };

        self.action.set_pending();
        info!(
            "Creating vault {:?} for {} ({} base units of {})",
            request.name, request.beneficiary, request.target, request.token
        );
        match ledger
            .create_vault(
                request.creator,
                request.name,
                request.beneficiary,
                request.token,
                request.target,
            )
            .await
        {
            Ok(confirmation) => {
                self.action.succeed(&confirmation);
                form.clear();
                Ok(confirmation)
            }
            Err(err) => {
                let err = match err {
                    EngineError::LedgerWrite(_) => err,
                    other => EngineError::LedgerWrite(other.to_string()),
                };
                self.action.fail(&err);
                Err(err)
            }
        }
    }
}
