//! Engine-wide error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::amount::AmountError;

/// Form / context fields that user-correctable errors are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Wallet,
    Network,
    Vault,
    Token,
    Amount,
    Name,
    Beneficiary,
    Currency,
    Target,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Network => "network",
            Self::Vault => "vault",
            Self::Token => "token",
            Self::Amount => "amount",
            Self::Name => "name",
            Self::Beneficiary => "beneficiary",
            Self::Currency => "currency",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Missing {field}")]
    MissingContext { field: Field },

    #[error("Invalid {field}: {source}")]
    InvalidAmount {
        field: Field,
        #[source]
        source: AmountError,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: Field, reason: String },

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },

    #[error("Allowance does not cover the requested amount; approve first")]
    AllowanceInsufficient,

    #[error("Another write from this action is still pending")]
    WriteInFlight,

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn missing(field: Field) -> Self {
        Self::MissingContext { field }
    }

    /// The form field a user-correctable error belongs to, if any.
    pub fn field(&self) -> Option<Field> {
        match self {
            Self::MissingContext { field }
            | Self::InvalidAmount { field, .. }
            | Self::InvalidInput { field, .. } => Some(*field),
            Self::InsufficientBalance { .. } | Self::AllowanceInsufficient => Some(Field::Amount),
            _ => None,
        }
    }

    pub fn is_user_correctable(&self) -> bool {
        self.field().is_some()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
