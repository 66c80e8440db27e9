//! # Vault reader
//!
//! Reads one vault's attributes from the ledger and derives its funding
//! [`Progress`].
//!
//! The name, beneficiary, target and token reads are independent futures
//! polled together; the balance read follows the token read because it is a
//! `balanceOf(vault)` query against that token. Each field lands in the
//! [`VaultSnapshot`] as soon as its own read completes, and a failure in one
//! field leaves the others intact.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::ledger::Ledger;
use crate::types::{Address, BaseUnits};

/// Availability of one independently read field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldRead<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> Default for FieldRead<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> FieldRead<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> FieldRead<U> {
        match self {
            Self::Pending => FieldRead::Pending,
            Self::Ready(v) => FieldRead::Ready(f(v)),
            Self::Failed(e) => FieldRead::Failed(e.clone()),
        }
    }
}

impl<T> From<Result<T>> for FieldRead<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Self::Ready(v),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Funding progress of a vault.
///
/// `percent` is `round(balance / target * 100)` and is not capped, so an
/// over-funded vault reports more than 100. The bar itself is capped:
/// `filled` never exceeds `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: u64,
    pub filled: BaseUnits,
    pub max: BaseUnits,
}

impl Progress {
    pub fn compute(balance: BaseUnits, target: BaseUnits) -> Self {
        Self {
            percent: percent(balance, target),
            filled: balance.min(target),
            max: target.max(1),
        }
    }

    /// Bar fill in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        (self.filled as f64 / self.max as f64).clamp(0.0, 1.0)
    }
}

fn percent(balance: BaseUnits, target: BaseUnits) -> u64 {
    if target == 0 {
        return 0;
    }
    // round-half-up of balance * 100 / target == floor((200 * balance + target) / (2 * target))
    let exact = balance
        .checked_mul(200)
        .and_then(|n| n.checked_add(target))
        .zip(target.checked_mul(2))
        .map(|(n, d)| n / d);
    let value = match exact {
        Some(v) => v,
        None => ((balance as f64 / target as f64) * 100.0).round() as BaseUnits,
    };
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultSnapshot {
    pub address: Address,
    pub name: FieldRead<String>,
    pub beneficiary: FieldRead<Address>,
    pub target: FieldRead<BaseUnits>,
    pub token: FieldRead<Address>,
    pub balance: FieldRead<BaseUnits>,
}

/// One field read completing.
#[derive(Debug)]
pub enum FieldUpdate {
    Name(Result<String>),
    Beneficiary(Result<Address>),
    Target(Result<BaseUnits>),
    Token(Result<Address>),
    Balance(Result<BaseUnits>),
}

impl VaultSnapshot {
    pub fn pending(address: Address) -> Self {
        Self {
            address,
            name: FieldRead::Pending,
            beneficiary: FieldRead::Pending,
            target: FieldRead::Pending,
            token: FieldRead::Pending,
            balance: FieldRead::Pending,
        }
    }

    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::Name(r) => self.name = r.into(),
            FieldUpdate::Beneficiary(r) => self.beneficiary = r.into(),
            FieldUpdate::Target(r) => self.target = r.into(),
            FieldUpdate::Token(r) => self.token = r.into(),
            FieldUpdate::Balance(r) => self.balance = r.into(),
        }
    }

    /// `None` until both balance and target are available.
    pub fn progress(&self) -> Option<Progress> {
        let balance = self.balance.ready()?;
        let target = self.target.ready()?;
        Some(Progress::compute(*balance, *target))
    }

    pub fn is_complete(&self) -> bool {
        !(self.name.is_pending()
            || self.beneficiary.is_pending()
            || self.target.is_pending()
            || self.token.is_pending()
            || self.balance.is_pending())
    }
}

#[derive(Clone)]
pub struct VaultReader {
    ledger: Arc<dyn Ledger>,
}

impl VaultReader {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Stream field updates for `vault` in completion order.
    pub fn updates(&self, vault: Address) -> BoxStream<'static, FieldUpdate> {
        let ledger = &self.ledger;
        let reads: Vec<BoxFuture<'static, Vec<FieldUpdate>>> = vec![
            {
                let ledger = Arc::clone(ledger);
                async move {
                    let name = ledger.vault_name(vault).await.map(|n| n.decode());
                    vec![FieldUpdate::Name(name)]
                }
                .boxed()
            },
            {
                let ledger = Arc::clone(ledger);
                async move { vec![FieldUpdate::Beneficiary(ledger.vault_beneficiary(vault).await)] }
                    .boxed()
            },
            {
                let ledger = Arc::clone(ledger);
                async move { vec![FieldUpdate::Target(ledger.vault_target(vault).await)] }.boxed()
            },
            {
                let ledger = Arc::clone(ledger);
                async move {
                    match ledger.vault_token(vault).await {
                        Ok(token) => {
                            let balance = ledger.balance_of(token, vault).await;
                            vec![FieldUpdate::Token(Ok(token)), FieldUpdate::Balance(balance)]
                        }
                        Err(err) => {
                            let reason = err.to_string();
                            vec![
                                FieldUpdate::Token(Err(err)),
                                FieldUpdate::Balance(Err(crate::errors::EngineError::LedgerRead(
                                    format!("token unavailable: {reason}"),
                                ))),
                            ]
                        }
                    }
                }
                .boxed()
            },
        ];

        reads
            .into_iter()
            .collect::<FuturesUnordered<_>>()
            .flat_map(futures::stream::iter)
            .boxed()
    }

    /// Read every field of `vault`. Never fails as a whole: unavailable
    /// fields are reported per field.
    pub async fn read(&self, vault: Address) -> VaultSnapshot {
        let mut snapshot = VaultSnapshot::pending(vault);
        let mut updates = self.updates(vault);
        while let Some(update) = updates.next().await {
            snapshot.apply(update);
        }
        debug!("Read vault {vault}: progress {:?}", snapshot.progress());
        snapshot
    }
}
