//! # Allowance controller
//!
//! Tracks whether the selected vault may pull the requested donation from
//! the connected wallet, and drives the approve step.
//!
//! ```text
//! Unknown ──► Insufficient ──► Sufficient
//!                  ▲                │
//!                  └────────────────┘  (amount / vault / token changed)
//! ```
//!
//! The state is never stored on its own: it is recomputed by [`evaluate`]
//! from the current requested amount and the last granted value fetched for
//! the current `(owner, spender, token)` triple.
//!
//! ## Stale responses
//!
//! Every allowance query is stamped with the selection epoch (bumped whenever
//! the triple changes) and a sequence number. A response is applied only if
//! its epoch is current and it is newer than the last applied one, so a slow
//! reply for a previous vault can never overwrite the current selection.
//!
//! ## Approval policy
//!
//! By default `approve` grants an unlimited allowance
//! ([`ApprovalPolicy::Unlimited`]), so later donations to the same vault skip
//! the approve step. [`ApprovalPolicy::Exact`] approves only the requested
//! amount.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{ActionSlot, ActionStatus};
use crate::errors::{EngineError, Field, Result};
use crate::ledger::{ApprovalAmount, Confirmation, Ledger};
use crate::types::{Address, BaseUnits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceState {
    Unknown,
    Insufficient,
    Sufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    #[default]
    Unlimited,
    Exact,
}

impl ApprovalPolicy {
    pub fn amount_for(&self, requested: BaseUnits) -> ApprovalAmount {
        match self {
            Self::Unlimited => ApprovalAmount::Unlimited,
            Self::Exact => ApprovalAmount::Exact(requested),
        }
    }
}

/// How the controller re-reads the allowance after an approval confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requery {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for Requery {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// The ledger triple an allowance is granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowanceKey {
    pub owner: Address,
    /// The vault.
    pub spender: Address,
    pub token: Address,
}

/// `granted >= requested`, and an empty request is never approved.
pub fn is_approved(granted: BaseUnits, requested: BaseUnits) -> bool {
    requested > 0 && granted >= requested
}

/// Pure transition function.
pub fn evaluate(requested: Option<BaseUnits>, granted: Option<BaseUnits>) -> AllowanceState {
    match (requested, granted) {
        (Some(r), Some(g)) if is_approved(g, r) => AllowanceState::Sufficient,
        (Some(_), Some(_)) => AllowanceState::Insufficient,
        _ => AllowanceState::Unknown,
    }
}

/// Ticket for one in-flight allowance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceQuery {
    pub key: AllowanceKey,
    epoch: u64,
    seq: u64,
}

#[derive(Debug, Default)]
struct Selection {
    key: Option<AllowanceKey>,
    requested: Option<BaseUnits>,
    granted: Option<BaseUnits>,
    epoch: u64,
    issued: u64,
    applied: u64,
}

impl Selection {
    fn state(&self) -> AllowanceState {
        evaluate(self.requested, self.granted)
    }
}

#[derive(Debug, Default)]
pub struct AllowanceController {
    selection: Mutex<Selection>,
    action: ActionSlot,
}

impl AllowanceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AllowanceState {
        self.selection.lock().state()
    }

    pub fn granted(&self) -> Option<BaseUnits> {
        self.selection.lock().granted
    }

    pub fn key(&self) -> Option<AllowanceKey> {
        self.selection.lock().key
    }

    pub fn action_status(&self) -> ActionStatus {
        self.action.status()
    }

    pub fn is_in_flight(&self) -> bool {
        self.action.is_in_flight()
    }

    /// Point the controller at a new selection. Changing the triple drops the
    /// known granted value and invalidates in-flight queries; changing only
    /// the amount re-evaluates against the last granted value.
    pub fn retarget(&self, key: Option<AllowanceKey>, requested: Option<BaseUnits>) -> AllowanceState {
        let mut sel = self.selection.lock();
        if sel.key != key {
            sel.key = key;
            sel.granted = None;
            sel.epoch += 1;
        }
        sel.requested = requested;
        sel.state()
    }

    /// Issue a ticket for the current triple, or `None` without a selection.
    pub fn begin_query(&self) -> Option<AllowanceQuery> {
        let mut sel = self.selection.lock();
        let key = sel.key?;
        sel.issued += 1;
        Some(AllowanceQuery {
            key,
            epoch: sel.epoch,
            seq: sel.issued,
        })
    }

    /// Apply a query result. Returns `false` when the response is stale and
    /// was discarded.
    pub fn apply(&self, query: AllowanceQuery, granted: BaseUnits) -> bool {
        let mut sel = self.selection.lock();
        if query.epoch != sel.epoch || query.seq <= sel.applied {
            debug!(
                "Discarding stale allowance response for spender {} (seq {})",
                query.key.spender, query.seq
            );
            return false;
        }
        sel.applied = query.seq;
        sel.granted = Some(granted);
        true
    }

    /// Fetch the granted amount for the current triple and re-evaluate.
    /// A read failure leaves the state untouched.
    pub async fn refresh(&self, ledger: &dyn Ledger) -> Result<AllowanceState> {
        let Some(query) = self.begin_query() else {
            return Ok(self.state());
        };
        let key = query.key;
        let granted = ledger.allowance(key.token, key.owner, key.spender).await?;
        self.apply(query, granted);
        Ok(self.state())
    }

    /// Authorize `key.spender` to pull `requested` (or more, per `policy`),
    /// then re-query until the new allowance is visible.
    ///
    /// `key` must be the current selection and `requested` positive.
    /// On a rejected write the state is unchanged and the failure is
    /// recorded in the action status; there is no automatic retry.
    pub async fn approve(
        &self,
        ledger: &dyn Ledger,
        key: AllowanceKey,
        requested: BaseUnits,
        policy: ApprovalPolicy,
        requery: Requery,
    ) -> Result<Confirmation> {
        if requested == 0 {
            return Err(EngineError::missing(Field::Amount));
        }
        if self.key() != Some(key) {
            return Err(EngineError::InvalidInput {
                field: Field::Vault,
                reason: format!("approval for vault {} is not the current selection", key.spender),
            });
        }
        let _guard = self.action.begin()?;
        self.action.set_pending();

        info!(
            "Approving {} on token {} for vault {} ({:?})",
            requested, key.token, key.spender, policy
        );
        let confirmation = match ledger
            .approve(key.owner, key.token, key.spender, policy.amount_for(requested))
            .await
        {
            Ok(confirmation) => confirmation,
            Err(err) => {
                let err = into_write_failure(err);
                warn!("Approval failed: {err}");
                self.action.fail(&err);
                return Err(err);
            }
        };
        self.action.succeed(&confirmation);

        // The new allowance may lag behind the confirmation; re-query a few times.
        for attempt in 1..=requery.attempts.max(1) {
            match self.refresh(ledger).await {
                Ok(AllowanceState::Sufficient) => break,
                Ok(state) => debug!("Allowance not yet visible (attempt {attempt}, {state:?})"),
                Err(err) => warn!("Allowance re-query failed (attempt {attempt}): {err}"),
            }
            if attempt < requery.attempts {
                tokio::time::sleep(requery.delay).await;
            }
        }
        if self.state() != AllowanceState::Sufficient {
            warn!(
                "Approval {} confirmed but allowance still reads {:?}",
                confirmation.tx_hash,
                self.granted()
            );
        }
        Ok(confirmation)
    }
}

fn into_write_failure(err: EngineError) -> EngineError {
    match err {
        EngineError::LedgerWrite(_) => err,
        other => EngineError::LedgerWrite(other.to_string()),
    }
}
