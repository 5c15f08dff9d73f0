//! Orion Ledger - Matrix Position and Commission Store
//!
//! Durable home for the Bright Orion matrix: members, positions, commission
//! entries and settings, kept in RocksDB and mutated only through optimistic
//! transactions.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB `OptimisticTransactionDB` with bounded commit retry
//! - **Activation**: placement, member update and commission posting as one
//!   transaction
//! - **Settings**: one stored object, read as a single snapshot per run
//! - **Admin CLI**: `orion-admin` for local operator commands
//!
//! # Example
//!
//! ```no_run
//! use orion_ledger::{ActivationRequest, LedgerConfig, MemberId, Storage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::from_config(&LedgerConfig::from_env()?)?;
//!     storage.bootstrap_root()?;
//!
//!     let member = storage.enroll_member(MemberId::ROOT, None)?;
//!     let outcome = storage.activate(ActivationRequest::for_member(&member)?)?;
//!     println!("placed under {}", outcome.position.parent_id);
//!     Ok(())
//! }
//! ```

pub mod activation;
pub mod config;
pub mod error;
pub mod storage;

mod keys;
mod txn;

pub use activation::{ActivationOutcome, ActivationRequest};
pub use config::LedgerConfig;
pub use error::{Error, Result};
pub use storage::{Balance, Storage};

pub use orion_matrix::{
    CommissionEntry, CommissionKey, CommissionStatus, MatrixPosition, MatrixView, Member,
    MemberCode, MemberId, MemberStatus, SettingsProvider, SettingsSnapshot,
};
