//! Shared plumbing for the write actions (approve, deposit, create vault):
//! the status reported to the presentation layer and the in-flight flag
//! that rejects a second submission while one is pending.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::errors::EngineError;
use crate::ledger::Confirmation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Idle,
    Pending,
    Succeeded {
        tx_hash: String,
        confirmed_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
}

impl ActionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Set while a write is outstanding. Claimed with [`InFlight::try_begin`];
/// the returned guard clears the flag on drop, including when the owning
/// future is cancelled.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Status cell plus in-flight flag for one write action.
#[derive(Debug)]
pub struct ActionSlot {
    in_flight: InFlight,
    status: Mutex<ActionStatus>,
}

impl Default for ActionSlot {
    fn default() -> Self {
        Self {
            in_flight: InFlight::default(),
            status: Mutex::new(ActionStatus::Idle),
        }
    }
}

impl ActionSlot {
    pub fn begin(&self) -> Result<InFlightGuard<'_>, EngineError> {
        self.in_flight.try_begin().ok_or(EngineError::WriteInFlight)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_set()
    }

    pub fn status(&self) -> ActionStatus {
        self.status.lock().clone()
    }

    /// Back to `Idle`, for an attempt rejected before anything was sent.
    pub fn reset(&self) {
        *self.status.lock() = ActionStatus::Idle;
    }

    pub fn set_pending(&self) {
        *self.status.lock() = ActionStatus::Pending;
    }

    pub fn succeed(&self, confirmation: &Confirmation) {
        *self.status.lock() = ActionStatus::Succeeded {
            tx_hash: confirmation.tx_hash.clone(),
            confirmed_at: Utc::now(),
        };
    }

    pub fn fail(&self, err: &EngineError) {
        *self.status.lock() = ActionStatus::Failed {
            reason: err.to_string(),
        };
    }
}
