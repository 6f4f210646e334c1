//! Sync run domain models.

use crate::errors::Error;
use crate::ledger::ReconcileOutcome;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// Every account and transaction went through
    #[default]
    Completed,
    /// Finished, but some accounts or transactions failed
    CompletedWithErrors,
    /// Aborted by a fatal error
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::CompletedWithErrors => "completed_with_errors",
            SyncRunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SyncRunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(SyncRunStatus::Completed),
            "completed_with_errors" => Ok(SyncRunStatus::CompletedWithErrors),
            "failed" => Ok(SyncRunStatus::Failed),
            other => Err(Error::Unexpected(format!("unknown sync run status '{}'", other))),
        }
    }
}

/// One failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunError {
    /// Error category, see [`Error::kind`]
    pub kind: String,
    pub account_id: Option<String>,
    /// Position and id of the offending transaction, e.g. `#3 (tx-3)`
    pub transaction_ref: Option<String>,
    pub message: String,
}

impl SyncRunError {
    pub fn from_error(
        error: &Error,
        account_id: Option<&str>,
        transaction_ref: Option<String>,
    ) -> Self {
        Self {
            kind: error.kind().to_string(),
            account_id: account_id.map(str::to_string),
            transaction_ref,
            message: error.to_string(),
        }
    }
}

/// Outcome of one execution of a sync job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub id: String,
    pub job_id: String,
    pub status: SyncRunStatus,
    pub accounts_processed: u32,
    /// Transactions seen, whether or not they reconciled
    pub transactions_processed: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub errors: Vec<SyncRunError>,
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

impl SyncRunResult {
    /// Start tallying a run for a job
    pub fn start(job_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            status: SyncRunStatus::Completed,
            accounts_processed: 0,
            transactions_processed: 0,
            created: 0,
            updated: 0,
            failed: 0,
            errors: Vec::new(),
            started_at: now,
            timestamp: now,
        }
    }

    pub fn record_account(&mut self) {
        self.accounts_processed += 1;
    }

    pub fn record_outcome(&mut self, outcome: ReconcileOutcome) {
        self.transactions_processed += 1;
        match outcome {
            ReconcileOutcome::Created => self.created += 1,
            ReconcileOutcome::Updated => self.updated += 1,
        }
    }

    /// A transaction that could not be mapped or stored
    pub fn record_transaction_failure(
        &mut self,
        account_id: &str,
        transaction_ref: String,
        error: &Error,
    ) {
        self.transactions_processed += 1;
        self.failed += 1;
        self.errors.push(SyncRunError::from_error(
            error,
            Some(account_id),
            Some(transaction_ref),
        ));
    }

    /// A failure outside any single transaction (listing, account fetch, timeout)
    pub fn record_error(&mut self, account_id: Option<&str>, error: &Error) {
        self.errors
            .push(SyncRunError::from_error(error, account_id, None));
    }

    /// Abort the run on a fatal error
    pub fn fail(&mut self, account_id: Option<&str>, error: &Error) {
        self.record_error(account_id, error);
        self.status = SyncRunStatus::Failed;
        self.timestamp = Utc::now();
    }

    /// Close the run, deriving the status from the recorded errors
    pub fn finish(&mut self) {
        if self.status != SyncRunStatus::Failed {
            self.status = if self.errors.is_empty() {
                SyncRunStatus::Completed
            } else {
                SyncRunStatus::CompletedWithErrors
            };
        }
        self.timestamp = Utc::now();
    }
}

/// Trait for the append-only sync run log
#[async_trait]
pub trait SyncRunRepositoryTrait: Send + Sync {
    /// Append a finished run
    async fn append(&self, run: SyncRunResult) -> Result<SyncRunResult>;

    /// Most recent runs first, optionally for one job
    fn list_recent(&self, job_id: Option<&str>, limit: i64) -> Result<Vec<SyncRunResult>>;
}
