//! Sync orchestrator: one run of a job over every linked account.
//!
//! A run lists requisitions, mirrors them locally, keeps the linked ones and
//! reconciles every booked transaction of every linked account in the job's
//! lookback window. Failures are collected into the run result. Only an
//! authentication failure aborts the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};

use famledger_core::bank::{ExternalTransaction, Requisition, RequisitionRepositoryTrait, RequisitionStatus};
use famledger_core::errors::{Error, Result};
use famledger_core::ledger::TransactionReconciler;
use famledger_core::sync::{SyncJob, SyncRunResult};

use super::progress::{SyncProgressPayload, SyncProgressReporter, SyncStatus};
use super::traits::BankDataClient;

/// Default bound on fetching and reconciling one account.
pub const DEFAULT_ACCOUNT_TIMEOUT_SECS: u64 = 60;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound for one account's fetch + reconcile.
    pub account_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            account_timeout: Duration::from_secs(DEFAULT_ACCOUNT_TIMEOUT_SECS),
        }
    }
}

/// Runs sync jobs against the provider and the ledger.
pub struct SyncOrchestrator {
    client: Arc<dyn BankDataClient>,
    reconciler: Arc<TransactionReconciler>,
    requisitions: Arc<dyn RequisitionRepositoryTrait>,
    progress_reporter: Arc<dyn SyncProgressReporter>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn BankDataClient>,
        reconciler: Arc<TransactionReconciler>,
        requisitions: Arc<dyn RequisitionRepositoryTrait>,
        progress_reporter: Arc<dyn SyncProgressReporter>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            reconciler,
            requisitions,
            progress_reporter,
            config,
        }
    }

    /// Execute one run of `job` with today's lookback window.
    pub async fn run(&self, job: &SyncJob) -> SyncRunResult {
        self.run_for_day(job, Utc::now().date_naive()).await
    }

    /// Execute one run of `job` as if today were `today`.
    pub async fn run_for_day(&self, job: &SyncJob, today: NaiveDate) -> SyncRunResult {
        let mut run = SyncRunResult::start(&job.id);
        let (date_from, date_to) = match job.lookback_window(today) {
            Ok(window) => window,
            Err(err) => {
                error!("Sync job '{}' has no usable lookback window: {}", job.id, err);
                self.progress_reporter.report_run_start(&job.id);
                run.fail(None, &err);
                run.finish();
                self.progress_reporter.report_run_complete(&run);
                return run;
            }
        };
        info!(
            "Starting sync run {} for job '{}' ({} -> {})",
            run.id, job.id, date_from, date_to
        );
        self.progress_reporter.report_run_start(&job.id);

        if let Err(fatal) = self.sync_linked_accounts(job, date_from, date_to, &mut run).await {
            error!("Sync run {} for job '{}' aborted: {}", run.id, job.id, fatal);
        }
        run.finish();

        self.progress_reporter.report_run_complete(&run);
        run
    }

    /// Returns `Err` only after recording a fatal error on `run`.
    async fn sync_linked_accounts(
        &self,
        job: &SyncJob,
        date_from: NaiveDate,
        date_to: NaiveDate,
        run: &mut SyncRunResult,
    ) -> Result<()> {
        let requisitions = match self.linked_requisitions(run).await {
            Ok(requisitions) => requisitions,
            Err(fatal) => {
                run.fail(None, &fatal);
                return Err(fatal);
            }
        };

        let mut seen = HashSet::new();
        let account_ids: Vec<String> = requisitions
            .iter()
            .flat_map(|r| r.linked_account_ids.iter())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();
        info!(
            "{} linked requisitions, {} accounts to sync",
            requisitions.len(),
            account_ids.len()
        );

        for account_id in account_ids {
            let outcome = tokio::time::timeout(
                self.config.account_timeout,
                self.sync_account(job, &account_id, date_from, date_to, run),
            )
            .await;

            match outcome {
                Ok(Ok(fetched)) => {
                    run.record_account();
                    self.progress_reporter.report_progress(
                        SyncProgressPayload::new(&job.id, &account_id, SyncStatus::Complete)
                            .with_transactions_fetched(fetched),
                    );
                }
                Ok(Err(err)) if err.is_fatal() => {
                    run.fail(Some(&account_id), &err);
                    self.report_account_failure(job, &account_id, &err);
                    return Err(err);
                }
                Ok(Err(err)) => {
                    warn!("Failed to sync account {}: {}", account_id, err);
                    run.record_error(Some(&account_id), &err);
                    self.report_account_failure(job, &account_id, &err);
                }
                Err(_) => {
                    let err = Error::Network(format!(
                        "Account sync timed out after {}s",
                        self.config.account_timeout.as_secs()
                    ));
                    warn!("Failed to sync account {}: {}", account_id, err);
                    run.record_error(Some(&account_id), &err);
                    self.report_account_failure(job, &account_id, &err);
                }
            }
        }

        Ok(())
    }

    /// Linked requisitions from the provider, mirrored into local storage.
    ///
    /// A non-fatal listing failure is recorded and the locally stored linked
    /// requisitions are used instead.
    async fn linked_requisitions(&self, run: &mut SyncRunResult) -> Result<Vec<Requisition>> {
        let requisitions = match self.client.list_requisitions().await {
            Ok(requisitions) => requisitions,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    "Failed to list requisitions, using stored linked requisitions: {}",
                    err
                );
                run.record_error(None, &err);
                return match self.requisitions.list_by_status(RequisitionStatus::Linked) {
                    Ok(stored) => Ok(stored),
                    Err(storage_err) => {
                        run.record_error(None, &storage_err);
                        Ok(Vec::new())
                    }
                };
            }
        };

        for requisition in &requisitions {
            if let Err(err) = self.requisitions.upsert(requisition.clone()).await {
                warn!("Failed to store requisition {}: {}", requisition.id, err);
                run.record_error(None, &err);
            }
        }

        let (linked, skipped): (Vec<Requisition>, Vec<Requisition>) =
            requisitions.into_iter().partition(Requisition::is_linked);
        for requisition in &skipped {
            debug!(
                "Skipping requisition {} with status {}",
                requisition.id, requisition.status
            );
        }
        Ok(linked)
    }

    /// Fetch and reconcile one account. Returns the number of booked
    /// transactions fetched.
    async fn sync_account(
        &self,
        job: &SyncJob,
        account_id: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        run: &mut SyncRunResult,
    ) -> Result<usize> {
        self.progress_reporter.report_progress(SyncProgressPayload::new(
            &job.id,
            account_id,
            SyncStatus::Syncing,
        ));

        let account = self.client.get_account(account_id).await?;
        let context = self.reconciler.account_context(&account).await?;
        let transactions = self
            .client
            .get_transactions(account_id, Some(date_from), Some(date_to))
            .await?;

        let fetched = transactions.booked.len();
        debug!(
            "Account {}: {} booked, {} pending (pending skipped)",
            account_id,
            fetched,
            transactions.pending.len()
        );

        for (index, payload) in transactions.booked.into_iter().enumerate() {
            let reference = ExternalTransaction::payload_ref(&payload, index + 1);
            let outcome = match ExternalTransaction::from_payload(payload) {
                Ok(transaction) => self.reconciler.reconcile(&transaction, &context).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(outcome) => run.record_outcome(outcome),
                Err(err) => {
                    warn!(
                        "Transaction {} on account {} failed: {}",
                        reference, account_id, err
                    );
                    run.record_transaction_failure(account_id, reference, &err);
                }
            }
        }

        Ok(fetched)
    }

    fn report_account_failure(&self, job: &SyncJob, account_id: &str, err: &Error) {
        self.progress_reporter.report_progress(
            SyncProgressPayload::new(&job.id, account_id, SyncStatus::Failed)
                .with_message(err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::progress::NoOpProgressReporter;
    use crate::sync::test_support::{linked, payload, requisition, ScriptedBankClient};
    use famledger_core::ledger::{Flow, NewLedgerTransaction};
    use famledger_core::sync::{SyncJobDefinition, SyncRunStatus};
    use famledger_core::testing::{
        InMemoryIdentityResolver, InMemoryLedgerRepository, InMemoryRequisitionRepository,
        StaticCategoryResolver,
    };
    use serde_json::json;

    struct Harness {
        client: Arc<ScriptedBankClient>,
        ledger: Arc<InMemoryLedgerRepository>,
        requisitions: Arc<InMemoryRequisitionRepository>,
        orchestrator: SyncOrchestrator,
    }

    fn harness(client: ScriptedBankClient) -> Harness {
        let client = Arc::new(client);
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let requisitions = Arc::new(InMemoryRequisitionRepository::new());
        let reconciler = Arc::new(TransactionReconciler::new(
            ledger.clone(),
            Arc::new(StaticCategoryResolver::new("groceries", 0.9)),
            Arc::new(InMemoryIdentityResolver::new(&["Jane", "John"])),
        ));
        let orchestrator = SyncOrchestrator::new(
            client.clone(),
            reconciler,
            requisitions.clone(),
            Arc::new(NoOpProgressReporter),
            SyncConfig {
                account_timeout: Duration::from_secs(5),
            },
        );
        Harness {
            client,
            ledger,
            requisitions,
            orchestrator,
        }
    }

    fn daily_job() -> SyncJob {
        SyncJobDefinition::new("daily-sync", "Daily sync", "0 6 * * *", 2, true)
            .into_job()
            .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.account_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_daily_sync_scenario() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-1"]))
                .with_transactions(
                    "acc-1",
                    vec![
                        payload("tx-new-1", "2024-03-13", "-12.40"),
                        payload("tx-new-2", "2024-03-14", "2500.00"),
                        payload("tx-seen", "2024-03-12", "-3.10"),
                    ],
                ),
        );
        h.ledger.seed(NewLedgerTransaction {
            id: None,
            date: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
            origin_id: "origin-common".to_string(),
            bank_id: "bank-sandboxfinance_sfin0000".to_string(),
            flow: Flow::Out,
            category_id: "groceries".to_string(),
            description: "Coffee".to_string(),
            income_amount: None,
            outgoing_amount: Some(rust_decimal_macros::dec!(3.10)),
            external_id: "tx-seen".to_string(),
            raw_payload: json!({}),
            confidence: 0.9,
            is_system_generated: true,
            is_validated: false,
        });

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.accounts_processed, 1);
        assert_eq!(run.transactions_processed, 3);
        assert_eq!(run.created, 2);
        assert_eq!(run.updated, 1);
        assert!(run.errors.is_empty());
        assert_eq!(h.ledger.len(), 3);
        assert_eq!(
            h.client.transaction_windows(),
            vec![(
                "acc-1".to_string(),
                NaiveDate::from_ymd_opt(2024, 3, 12),
                NaiveDate::from_ymd_opt(2024, 3, 14)
            )]
        );
    }

    #[tokio::test]
    async fn test_mapping_failure_is_isolated() {
        let mut broken = payload("tx-3", "2024-03-14", "-1.00");
        broken["transactionAmount"]["amount"] = json!("not-a-number");
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-1"]))
                .with_transactions(
                    "acc-1",
                    vec![
                        payload("tx-1", "2024-03-14", "-1.00"),
                        payload("tx-2", "2024-03-14", "-2.00"),
                        broken,
                        payload("tx-4", "2024-03-14", "-4.00"),
                        payload("tx-5", "2024-03-14", "-5.00"),
                    ],
                ),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::CompletedWithErrors);
        assert_eq!(run.transactions_processed, 5);
        assert_eq!(run.created, 4);
        assert_eq!(run.failed, 1);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].kind, "mapping");
        assert_eq!(run.errors[0].transaction_ref.as_deref(), Some("#3 (tx-3)"));
        assert_eq!(run.errors[0].account_id.as_deref(), Some("acc-1"));
    }

    #[tokio::test]
    async fn test_only_linked_requisitions_are_synced() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(requisition("req-new", RequisitionStatus::Created, &["acc-a"]))
                .with_requisition(requisition("req-old", RequisitionStatus::Expired, &["acc-b"]))
                .with_requisition(requisition("req-bad", RequisitionStatus::Error, &["acc-c"]))
                .with_transactions("acc-a", vec![payload("tx-a", "2024-03-14", "-1.00")]),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.accounts_processed, 0);
        assert_eq!(run.transactions_processed, 0);
        assert!(h.client.transaction_windows().is_empty());
        // Every listed requisition is still mirrored locally.
        assert_eq!(h.requisitions.list().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_account_failure_does_not_stop_other_accounts() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-broken", "acc-ok"]))
                .with_account_error("acc-broken", Error::remote(500, "upstream"))
                .with_transactions("acc-ok", vec![payload("tx-1", "2024-03-14", "-1.00")]),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::CompletedWithErrors);
        assert_eq!(run.accounts_processed, 1);
        assert_eq!(run.created, 1);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].kind, "remote");
        assert_eq!(run.errors[0].account_id.as_deref(), Some("acc-broken"));
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_the_run() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-1", "acc-2"]))
                .with_account_error("acc-1", Error::Auth("credentials rejected".to_string()))
                .with_transactions("acc-2", vec![payload("tx-1", "2024-03-14", "-1.00")]),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::Failed);
        assert_eq!(run.accounts_processed, 0);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].kind, "auth");
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_listing_auth_failure_fails_run() {
        let h = harness(
            ScriptedBankClient::new()
                .with_listing_error(Error::Auth("token acquisition failed".to_string())),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::Failed);
        assert_eq!(run.errors[0].kind, "auth");
    }

    #[tokio::test]
    async fn test_listing_failure_falls_back_to_stored_requisitions() {
        let h = harness(
            ScriptedBankClient::new()
                .with_listing_error(Error::Network("connection reset".to_string()))
                .with_transactions("acc-1", vec![payload("tx-1", "2024-03-14", "-1.00")]),
        );
        h.requisitions
            .upsert(linked("req-1", &["acc-1"]))
            .await
            .unwrap();
        h.requisitions
            .upsert(requisition("req-2", RequisitionStatus::Expired, &["acc-2"]))
            .await
            .unwrap();

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::CompletedWithErrors);
        assert_eq!(run.accounts_processed, 1);
        assert_eq!(run.created, 1);
        assert_eq!(run.errors[0].kind, "network");
        assert!(run.errors[0].account_id.is_none());
    }

    #[tokio::test]
    async fn test_slow_account_times_out() {
        let client = ScriptedBankClient::new()
            .with_requisition(linked("req-1", &["acc-slow"]))
            .with_transactions("acc-slow", vec![payload("tx-1", "2024-03-14", "-1.00")])
            .with_delay(Duration::from_millis(500));
        let mut h = harness(client);
        h.orchestrator.config.account_timeout = Duration::from_millis(50);

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.status, SyncRunStatus::CompletedWithErrors);
        assert_eq!(run.accounts_processed, 0);
        assert!(run.errors[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_shared_account_is_synced_once() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-1"]))
                .with_requisition(linked("req-2", &["acc-1"]))
                .with_transactions("acc-1", vec![payload("tx-1", "2024-03-14", "-1.00")]),
        );

        let run = h.orchestrator.run_for_day(&daily_job(), today()).await;

        assert_eq!(run.accounts_processed, 1);
        assert_eq!(h.client.transaction_windows().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_lookback_fails_the_run() {
        let h = harness(
            ScriptedBankClient::new()
                .with_requisition(linked("req-1", &["acc-1"]))
                .with_transactions("acc-1", vec![payload("tx-1", "2024-03-14", "-1.00")]),
        );
        let mut job = daily_job();
        job.lookback_days = u32::MAX;

        let run = h.orchestrator.run_for_day(&job, today()).await;

        assert_eq!(run.status, SyncRunStatus::Failed);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.accounts_processed, 0);
        assert_eq!(h.client.transaction_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(h.ledger.is_empty());
    }
}
