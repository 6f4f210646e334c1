//! famledger Core - Domain entities, reconciliation and scheduling rules.
//!
//! This crate holds the bank-sync business logic for famledger.
//! It is database-agnostic and defines traits that are implemented
//! by the `storage-sqlite` crate and consumed by `connect`.

pub mod bank;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
