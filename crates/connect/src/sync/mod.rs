//! Bank sync: provider trait, run orchestration and job scheduling.

mod orchestrator;
pub mod progress;
mod scheduler;
mod traits;

#[cfg(test)]
mod test_support;

pub use orchestrator::{SyncConfig, SyncOrchestrator, DEFAULT_ACCOUNT_TIMEOUT_SECS};
pub use progress::{
    LogProgressReporter, NoOpProgressReporter, SyncProgressPayload, SyncProgressReporter,
    SyncStatus,
};
pub use scheduler::SyncScheduler;
pub use traits::BankDataClient;
