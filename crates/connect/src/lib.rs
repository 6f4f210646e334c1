//! famledger Connect - Bank-data provider access and sync scheduling.
//!
//! This crate talks to the bank-data API (or its sandbox stub), keeps the
//! provider token fresh, and runs sync jobs that reconcile fetched
//! transactions into the ledger.

pub mod client;
pub mod provider;
pub mod stub;
pub mod sync;
pub mod token;

// Re-export commonly used types
pub use client::{LiveBankDataClient, DEFAULT_BANK_API_URL, DEFAULT_TIMEOUT_SECS};
pub use provider::{create_bank_client, ProviderMode, ProviderSettings};
pub use stub::StubBankDataClient;
pub use sync::{
    BankDataClient, LogProgressReporter, NoOpProgressReporter, SyncConfig, SyncOrchestrator,
    SyncProgressReporter, SyncScheduler,
};
pub use token::{HttpTokenEndpoint, TokenManager, TokenState};
