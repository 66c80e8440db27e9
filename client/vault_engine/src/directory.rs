//! Vault discovery and the vault list view-models.
//!
//! The directory returns addresses exactly as the registry lists them
//! (creation order, no dedup, no sort). Each vault is read independently
//! through [`VaultReader`] and every field lands in a [`VaultListing`] as soon
//! as its own read completes, so a slow or broken vault never holds back the
//! rows around it.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::amount;
use crate::errors::Result;
use crate::ledger::Ledger;
use crate::registry::NetworkView;
use crate::types::Address;
use crate::vault::{FieldRead, FieldUpdate, VaultReader, VaultSnapshot};

/// One row of the vault table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultView {
    pub address: Address,
    pub short_address: String,
    pub name: FieldRead<String>,
    pub beneficiary: FieldRead<Address>,
    pub token: FieldRead<Address>,
    pub symbol: Option<String>,
    /// Decimal string in the token's precision.
    pub balance: FieldRead<String>,
    pub target: FieldRead<String>,
    pub progress: Option<u64>,
}

impl VaultView {
    pub fn from_snapshot(snapshot: &VaultSnapshot, network: &NetworkView) -> Self {
        let descriptor = snapshot.token.ready().and_then(|t| network.find(*t));
        let render = |units: &FieldRead<u128>| match (units, descriptor) {
            (FieldRead::Ready(u), Some(d)) => {
                FieldRead::Ready(amount::to_decimal_string(*u, d.decimals))
            }
            (FieldRead::Ready(_), None) => match &snapshot.token {
                FieldRead::Ready(t) => FieldRead::Failed(format!(
                    "token {t} is not recognised on network {}",
                    network.network
                )),
                FieldRead::Pending => FieldRead::Pending,
                FieldRead::Failed(e) => FieldRead::Failed(e.clone()),
            },
            (FieldRead::Pending, _) => FieldRead::Pending,
            (FieldRead::Failed(e), _) => FieldRead::Failed(e.clone()),
        };

        Self {
            address: snapshot.address,
            short_address: snapshot.address.short(),
            name: snapshot.name.clone(),
            beneficiary: snapshot.beneficiary.clone(),
            token: snapshot.token.clone(),
            symbol: descriptor.map(|d| d.symbol.clone()),
            balance: render(&snapshot.balance),
            target: render(&snapshot.target),
            progress: snapshot.progress().map(|p| p.percent),
        }
    }

    pub fn has_failures(&self) -> bool {
        [
            matches!(self.name, FieldRead::Failed(_)),
            matches!(self.beneficiary, FieldRead::Failed(_)),
            matches!(self.token, FieldRead::Failed(_)),
            matches!(self.balance, FieldRead::Failed(_)),
            matches!(self.target, FieldRead::Failed(_)),
        ]
        .contains(&true)
    }
}

/// One field of the vault at `index` in the listing.
#[derive(Debug)]
pub struct ListingUpdate {
    pub index: usize,
    pub update: FieldUpdate,
}

/// The vault table while it fills in. Starts with every field pending.
#[derive(Debug, Clone)]
pub struct VaultListing {
    network: NetworkView,
    snapshots: Vec<VaultSnapshot>,
}

impl VaultListing {
    pub fn pending(vaults: &[Address], network: NetworkView) -> Self {
        Self {
            network,
            snapshots: vaults.iter().map(|v| VaultSnapshot::pending(*v)).collect(),
        }
    }

    /// Apply one field update and return the re-rendered row.
    pub fn apply(&mut self, update: ListingUpdate) -> Option<VaultView> {
        let snapshot = self.snapshots.get_mut(update.index)?;
        snapshot.apply(update.update);
        Some(VaultView::from_snapshot(snapshot, &self.network))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.snapshots.iter().all(VaultSnapshot::is_complete)
    }

    pub fn views(&self) -> Vec<VaultView> {
        self.snapshots
            .iter()
            .map(|s| VaultView::from_snapshot(s, &self.network))
            .collect()
    }
}

pub struct VaultDirectory {
    ledger: Arc<dyn Ledger>,
    reader: VaultReader,
    network: NetworkView,
}

impl VaultDirectory {
    pub fn new(ledger: Arc<dyn Ledger>, network: NetworkView) -> Self {
        Self {
            reader: VaultReader::new(Arc::clone(&ledger)),
            ledger,
            network,
        }
    }

    pub fn reader(&self) -> &VaultReader {
        &self.reader
    }

    pub async fn list_for_beneficiary(&self, beneficiary: Address) -> Result<Vec<Address>> {
        self.ledger.list_vaults_by_beneficiary(beneficiary).await
    }

    pub async fn list_all(&self) -> Result<Vec<Address>> {
        self.ledger.list_all_vaults().await
    }

    /// An all-pending listing for `vaults`, ready to receive [`Self::updates`].
    pub fn listing(&self, vaults: &[Address]) -> VaultListing {
        VaultListing::pending(vaults, self.network.clone())
    }

    /// Field updates for every vault in `vaults`, merged in completion order.
    pub fn updates(&self, vaults: &[Address]) -> BoxStream<'static, ListingUpdate> {
        stream::select_all(vaults.iter().enumerate().map(|(index, vault)| {
            self.reader
                .updates(*vault)
                .map(move |update| ListingUpdate { index, update })
                .boxed()
        }))
        .boxed()
    }

    /// Drain updates into `listing` until every field is in or `wait`
    /// elapses; whatever has not arrived stays pending.
    pub async fn fill(
        &self,
        listing: &mut VaultListing,
        mut updates: BoxStream<'static, ListingUpdate>,
        wait: Duration,
    ) {
        let drained = tokio::time::timeout(wait, async {
            while let Some(update) = updates.next().await {
                listing.apply(update);
            }
        })
        .await;
        if drained.is_err() {
            warn!("Vault listing still incomplete after {}s", wait.as_secs());
        }
    }

    /// Rows for `vaults` as they stand after at most `wait`.
    pub async fn resolve_within(&self, vaults: &[Address], wait: Duration) -> Vec<VaultView> {
        let mut listing = self.listing(vaults);
        self.fill(&mut listing, self.updates(vaults), wait).await;
        let views = listing.views();
        for view in views.iter().filter(|v| v.has_failures()) {
            warn!("Vault {} resolved with unavailable fields", view.address);
        }
        views
    }

    pub async fn views_for_beneficiary(
        &self,
        beneficiary: Address,
        wait: Duration,
    ) -> Result<Vec<VaultView>> {
        let vaults = self.list_for_beneficiary(beneficiary).await?;
        info!("{} vault(s) for beneficiary {beneficiary}", vaults.len());
        Ok(self.resolve_within(&vaults, wait).await)
    }

    pub async fn views_all(&self, wait: Duration) -> Result<Vec<VaultView>> {
        let vaults = self.list_all().await?;
        info!("{} vault(s) registered", vaults.len());
        Ok(self.resolve_within(&vaults, wait).await)
    }
}
