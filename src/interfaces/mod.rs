//! Abstract interfaces for the custody subsystem.
//!
//! These traits define the contracts for:
//! - Ledger storage (append-only, hash-chained event log)
//! - Custody storage (properties, credentials, transfers, audit records)

pub mod custody_store;
pub mod ledger_store;

pub use custody_store::CustodyStore;
pub use ledger_store::{LedgerStore, Result, StorageError};
