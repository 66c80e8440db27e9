//! # ImProof vault engine
//!
//! Core of the donation workflow: which stablecoins are valid on the
//! connected network, the approve-then-deposit flow, and vault discovery
//! with funding progress.
//!
//! | Component            | Module                         |
//! |----------------------|--------------------------------|
//! | Chain registry       | [`registry`]                   |
//! | Amount codec         | [`amount`]                     |
//! | Allowance controller | [`allowance`]                  |
//! | Deposit controller   | [`deposit`]                    |
//! | Donation form        | [`session`]                    |
//! | Vault reader         | [`vault`]                      |
//! | Vault directory      | [`directory`]                  |
//! | Vault creation       | [`creation`]                   |
//! | Ledger access        | [`ledger`]                     |
//!
//! Nothing here keeps state beyond the session: every value read from the
//! ledger is a point-in-time copy and is re-queried after writes.

pub mod action;
pub mod allowance;
pub mod amount;
pub mod config;
pub mod creation;
pub mod deposit;
pub mod directory;
pub mod errors;
pub mod ledger;
pub mod registry;
pub mod session;
pub mod types;
pub mod vault;

#[cfg(test)]
mod test_directory;
#[cfg(test)]
mod test_donation_flow;

pub use allowance::{AllowanceController, AllowanceState, ApprovalPolicy};
pub use config::Config;
pub use deposit::DepositController;
pub use directory::{VaultDirectory, VaultView};
pub use errors::{EngineError, Field, Result};
pub use ledger::Ledger;
pub use registry::{ChainRegistry, NetworkView};
pub use session::DonationSession;
pub use types::{Address, AddressError, BaseUnits, NetworkId, StablecoinDescriptor, VaultName};
pub use vault::{Progress, VaultReader, VaultSnapshot};
