//! Shared storage integration tests.
//!
//! Tests the CustodyStore interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod custody_store_tests;
