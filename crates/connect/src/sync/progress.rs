//! Progress reporting for sync runs.
//!
//! The orchestrator reports through this trait so hosts can forward progress
//! to their own sinks (logs, server-sent events, ...).

use log::{info, warn};
use serde::{Deserialize, Serialize};

use famledger_core::sync::{SyncRunResult, SyncRunStatus};

/// Status of one account within a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Syncing,
    Complete,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Complete => write!(f, "complete"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Payload for account progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressPayload {
    pub job_id: String,
    /// Provider account id
    pub account_id: String,
    pub status: String,
    /// Booked transactions fetched for the account so far
    pub transactions_fetched: usize,
    pub message: Option<String>,
}

impl SyncProgressPayload {
    pub fn new(
        job_id: impl Into<String>,
        account_id: impl Into<String>,
        status: SyncStatus,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            account_id: account_id.into(),
            status: status.to_string(),
            transactions_fetched: 0,
            message: None,
        }
    }

    pub fn with_transactions_fetched(mut self, count: usize) -> Self {
        self.transactions_fetched = count;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Trait for reporting sync progress.
pub trait SyncProgressReporter: Send + Sync {
    /// Report progress for one account.
    fn report_progress(&self, payload: SyncProgressPayload);

    /// Report that a run is starting.
    fn report_run_start(&self, job_id: &str);

    /// Report that a run finished (successfully or not).
    fn report_run_complete(&self, result: &SyncRunResult);
}

/// A no-op progress reporter for contexts where progress reporting is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressReporter;

impl SyncProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _payload: SyncProgressPayload) {}

    fn report_run_start(&self, _job_id: &str) {}

    fn report_run_complete(&self, _result: &SyncRunResult) {}
}

/// Writes progress to the log.
#[derive(Debug, Clone, Default)]
pub struct LogProgressReporter;

impl SyncProgressReporter for LogProgressReporter {
    fn report_progress(&self, payload: SyncProgressPayload) {
        info!(
            "[Sync {}] account {} {} ({} fetched){}",
            payload.job_id,
            payload.account_id,
            payload.status,
            payload.transactions_fetched,
            payload
                .message
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        );
    }

    fn report_run_start(&self, job_id: &str) {
        info!("[Sync {}] run starting", job_id);
    }

    fn report_run_complete(&self, result: &SyncRunResult) {
        let line = format!(
            "[Sync {}] run {} {}: {} accounts, {} transactions ({} created, {} updated, {} failed)",
            result.job_id,
            result.id,
            result.status.as_str(),
            result.accounts_processed,
            result.transactions_processed,
            result.created,
            result.updated,
            result.failed
        );
        if result.status == SyncRunStatus::Completed {
            info!("{}", line);
        } else {
            warn!("{} with {} errors", line, result.errors.len());
        }
    }
}
