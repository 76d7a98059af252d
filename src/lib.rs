//! Handreceipt custody - transfer adjudication and tamper-evident audit ledger
//!
//! Tracks who holds each accountable property item, hands custody over via
//! scanned QR credentials and records every custody-affecting event in a
//! hash-chained, append-only ledger.

pub mod config;
pub mod coordinator;
pub mod custody;
pub mod interfaces;
pub mod storage;
pub mod utils;

pub use coordinator::CustodyCoordinator;
pub use custody::{CustodyError, CustodyResult};
