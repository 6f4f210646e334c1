//! Registry of sync jobs with one timer task per active job.
//!
//! Each active job owns a tokio task that sleeps until the rule's next
//! trigger and then runs the job. Stopping a job only interrupts that sleep:
//! a run already in progress always finishes and is recorded. Runs of the
//! same job are serialized by a per-job lock; different jobs run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use famledger_core::bank::{Requisition, RequisitionRepositoryTrait};
use famledger_core::errors::{Error, Result};
use famledger_core::sync::{SyncJob, SyncRunRepositoryTrait, SyncRunResult};

use super::orchestrator::SyncOrchestrator;

struct JobEntry {
    job: SyncJob,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    /// Present while the timer task is armed.
    stop_signal: Option<watch::Sender<bool>>,
}

impl JobEntry {
    fn disarm(&mut self) {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(true);
        }
    }
}

struct SchedulerInner {
    jobs: Mutex<HashMap<String, JobEntry>>,
    orchestrator: Arc<SyncOrchestrator>,
    runs: Arc<dyn SyncRunRepositoryTrait>,
    requisitions: Arc<dyn RequisitionRepositoryTrait>,
    initial_sync_job: Option<String>,
    /// Timer tasks and manual runs, awaited on shutdown.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn not_found(job_id: &str) -> Error {
    Error::NotFound(format!("sync job '{}'", job_id))
}

impl SchedulerInner {
    fn lock_jobs(&self) -> Result<MutexGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .lock()
            .map_err(|_| Error::Scheduler("job registry lock poisoned".to_string()))
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.is_finished());
            tasks.push(handle);
        }
    }

    /// Recompute `next_run_at` for an active job and return it.
    fn schedule_next(&self, job_id: &str) -> Option<DateTime<Utc>> {
        let mut jobs = self.lock_jobs().ok()?;
        let entry = jobs.get_mut(job_id)?;
        entry.job.schedule_from(Utc::now());
        entry.job.next_run_at
    }

    /// Run a job once, append the result and update its timestamps.
    async fn execute(&self, job_id: &str) -> Result<SyncRunResult> {
        let (job, run_lock) = {
            let jobs = self.lock_jobs()?;
            let entry = jobs.get(job_id).ok_or_else(|| not_found(job_id))?;
            (entry.job.clone(), entry.run_lock.clone())
        };

        let _running = run_lock.lock().await;
        let result = self.orchestrator.run(&job).await;

        let stored = match self.runs.append(result.clone()).await {
            Ok(stored) => stored,
            Err(err) => {
                error!("Failed to record sync run {}: {}", result.id, err);
                result
            }
        };

        if let Ok(mut jobs) = self.lock_jobs() {
            if let Some(entry) = jobs.get_mut(job_id) {
                entry.job.last_run_at = Some(stored.timestamp);
                entry.job.schedule_from(Utc::now());
            }
        }
        Ok(stored)
    }
}

/// Sleep until each trigger and run the job, until stopped.
async fn run_timer(inner: Weak<SchedulerInner>, job_id: String, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        let next_run = match inner.upgrade().and_then(|inner| inner.schedule_next(&job_id)) {
            Some(next_run) => next_run,
            None => break,
        };
        let wait = (next_run - Utc::now()).to_std().unwrap_or_default();
        debug!("Job '{}' next run at {}", job_id, next_run);

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let Some(inner) = inner.upgrade() else { break };
        if let Err(err) = inner.execute(&job_id).await {
            warn!("Scheduled run of job '{}' failed: {}", job_id, err);
            break;
        }
    }
    debug!("Timer for job '{}' stopped", job_id);
}

/// Named sync jobs with recurrence rules and active/inactive state.
///
/// Timers are spawned on the ambient tokio runtime, so jobs must be
/// registered and started from within it.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        runs: Arc<dyn SyncRunRepositoryTrait>,
        requisitions: Arc<dyn RequisitionRepositoryTrait>,
        initial_sync_job: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: Mutex::new(HashMap::new()),
                orchestrator,
                runs,
                requisitions,
                initial_sync_job,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    fn arm(&self, entry: &mut JobEntry) {
        if entry.stop_signal.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        entry.stop_signal = Some(stop_tx);
        let handle = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            entry.job.id.clone(),
            stop_rx,
        ));
        self.inner.track(handle);
    }

    /// Add a job; its timer is armed when it is active.
    pub fn register(&self, mut job: SyncJob) -> Result<SyncJob> {
        let mut jobs = self.inner.lock_jobs()?;
        if jobs.contains_key(&job.id) {
            return Err(Error::Scheduler(format!(
                "sync job '{}' is already registered",
                job.id
            )));
        }

        job.schedule_from(Utc::now());
        let mut entry = JobEntry {
            job: job.clone(),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            stop_signal: None,
        };
        if job.is_active {
            self.arm(&mut entry);
        }
        info!(
            "Registered sync job '{}' ({}, {} day lookback, {})",
            job.id,
            job.recurrence_rule,
            job.lookback_days,
            if job.is_active { "active" } else { "inactive" }
        );
        jobs.insert(job.id.clone(), entry);
        Ok(job)
    }

    /// Activate a job and arm its timer.
    pub fn start(&self, job_id: &str) -> Result<SyncJob> {
        let mut jobs = self.inner.lock_jobs()?;
        let entry = jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        entry.job.is_active = true;
        entry.job.schedule_from(Utc::now());
        self.arm(entry);
        info!("Started sync job '{}'", job_id);
        Ok(entry.job.clone())
    }

    /// Deactivate a job. A run in progress is left to finish.
    pub fn stop(&self, job_id: &str) -> Result<SyncJob> {
        let mut jobs = self.inner.lock_jobs()?;
        let entry = jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        entry.job.is_active = false;
        entry.job.next_run_at = None;
        entry.disarm();
        info!("Stopped sync job '{}'", job_id);
        Ok(entry.job.clone())
    }

    /// Disarm and delete a job.
    pub fn remove(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.inner.lock_jobs()?;
        let mut entry = jobs.remove(job_id).ok_or_else(|| not_found(job_id))?;
        entry.disarm();
        info!("Removed sync job '{}'", job_id);
        Ok(())
    }

    /// Start a manual run in the background.
    pub fn trigger(&self, job_id: &str) -> Result<()> {
        if !self.inner.lock_jobs()?.contains_key(job_id) {
            return Err(not_found(job_id));
        }

        let inner = self.inner.clone();
        let id = job_id.to_string();
        let handle = tokio::spawn(async move {
            if let Err(err) = inner.execute(&id).await {
                warn!("Manual run of job '{}' failed: {}", id, err);
            }
        });
        self.inner.track(handle);
        info!("Triggered sync job '{}'", job_id);
        Ok(())
    }

    /// Run a job now and return its recorded result.
    pub async fn trigger_and_wait(&self, job_id: &str) -> Result<SyncRunResult> {
        self.inner.execute(job_id).await
    }

    /// All jobs, ordered by id.
    pub fn list_jobs(&self) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .inner
            .lock_jobs()?
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    pub fn get_job(&self, job_id: &str) -> Result<SyncJob> {
        self.inner
            .lock_jobs()?
            .get(job_id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| not_found(job_id))
    }

    /// Most recent runs first, optionally for one job.
    pub fn recent_runs(&self, job_id: Option<&str>, limit: i64) -> Result<Vec<SyncRunResult>> {
        self.inner.runs.list_recent(job_id, limit)
    }

    /// Store a requisition reported by the consent callback and, once it is
    /// linked, kick off the initial sync job.
    ///
    /// Returns whether a sync was triggered. A configured initial job that is
    /// not registered is logged and skipped.
    pub async fn notify_accounts_linked(&self, requisition: Requisition) -> Result<bool> {
        let linked = requisition.is_linked();
        let requisition_id = requisition.id.clone();
        self.inner.requisitions.upsert(requisition).await?;

        if !linked {
            debug!(
                "Requisition {} is not linked yet, no initial sync",
                requisition_id
            );
            return Ok(false);
        }

        let Some(job_id) = &self.inner.initial_sync_job else {
            return Ok(false);
        };
        match self.trigger(job_id) {
            Ok(()) => {
                info!(
                    "Requisition {} linked, triggered initial sync '{}'",
                    requisition_id, job_id
                );
                Ok(true)
            }
            Err(Error::NotFound(_)) => {
                warn!(
                    "Requisition {} linked but initial sync job '{}' is not registered",
                    requisition_id, job_id
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Disarm every timer and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut jobs) = self.inner.lock_jobs() {
            for entry in jobs.values_mut() {
                entry.disarm();
            }
        }

        let tasks: Vec<JoinHandle<()>> = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            if let Err(err) = task.await {
                warn!("Sync task ended abnormally: {}", err);
            }
        }
        info!("Sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::orchestrator::SyncConfig;
    use crate::sync::progress::NoOpProgressReporter;
    use crate::sync::test_support::{linked, payload, requisition, ScriptedBankClient};
    use famledger_core::bank::RequisitionStatus;
    use famledger_core::ledger::TransactionReconciler;
    use famledger_core::sync::{SyncJobDefinition, SyncRunStatus};
    use famledger_core::testing::{
        InMemoryIdentityResolver, InMemoryLedgerRepository, InMemoryRequisitionRepository,
        InMemorySyncRunRepository, StaticCategoryResolver,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        client: Arc<ScriptedBankClient>,
        runs: Arc<InMemorySyncRunRepository>,
        requisitions: Arc<InMemoryRequisitionRepository>,
        scheduler: SyncScheduler,
    }

    fn harness(client: ScriptedBankClient) -> Harness {
        let client = Arc::new(client);
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let requisitions = Arc::new(InMemoryRequisitionRepository::new());
        let reconciler = Arc::new(TransactionReconciler::new(
            Arc::new(InMemoryLedgerRepository::new()),
            Arc::new(StaticCategoryResolver::new("groceries", 0.9)),
            Arc::new(InMemoryIdentityResolver::new(&["Jane"])),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            client.clone(),
            reconciler,
            requisitions.clone(),
            Arc::new(NoOpProgressReporter),
            SyncConfig::default(),
        ));
        let scheduler = SyncScheduler::new(
            orchestrator,
            runs.clone(),
            requisitions.clone(),
            Some("daily-sync".to_string()),
        );
        Harness {
            client,
            runs,
            requisitions,
            scheduler,
        }
    }

    fn one_account_client() -> ScriptedBankClient {
        ScriptedBankClient::new()
            .with_requisition(linked("req-1", &["acc-1"]))
            .with_transactions("acc-1", vec![payload("tx-1", "2024-03-14", "-9.99")])
    }

    fn job(id: &str, rule: &str, active: bool) -> SyncJob {
        SyncJobDefinition::new(id, id, rule, 2, active)
            .into_job()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let h = harness(one_account_client());
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();

        let err = h
            .scheduler
            .register(job("daily-sync", "0 7 * * *", false))
            .unwrap_err();

        assert!(matches!(err, Error::Scheduler(_)));
        assert_eq!(h.scheduler.list_jobs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_run_only_while_active() {
        let h = harness(one_account_client());
        let registered = h
            .scheduler
            .register(job("daily-sync", "0 6 * * *", false))
            .unwrap();
        assert!(registered.next_run_at.is_none());

        let started = h.scheduler.start("daily-sync").unwrap();
        assert!(started.is_active);
        assert!(started.next_run_at.unwrap() > Utc::now());

        let stopped = h.scheduler.stop("daily-sync").unwrap();
        assert!(!stopped.is_active);
        assert!(stopped.next_run_at.is_none());
        h.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = harness(one_account_client());

        assert!(matches!(h.scheduler.start("nope"), Err(Error::NotFound(_))));
        assert!(matches!(h.scheduler.stop("nope"), Err(Error::NotFound(_))));
        assert!(matches!(h.scheduler.trigger("nope"), Err(Error::NotFound(_))));
        assert!(matches!(h.scheduler.remove("nope"), Err(Error::NotFound(_))));
        assert!(matches!(
            h.scheduler.trigger_and_wait("nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trigger_and_wait_records_run() {
        let h = harness(one_account_client());
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();

        let run = h.scheduler.trigger_and_wait("daily-sync").await.unwrap();

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.created, 1);
        let recorded = h.scheduler.recent_runs(Some("daily-sync"), 10).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, run.id);
        assert_eq!(
            h.scheduler.get_job("daily-sync").unwrap().last_run_at,
            Some(run.timestamp)
        );
    }

    #[tokio::test]
    async fn test_remove_deletes_job() {
        let h = harness(one_account_client());
        h.scheduler.register(job("weekly", "0 3 * * 0", true)).unwrap();

        h.scheduler.remove("weekly").unwrap();

        assert!(h.scheduler.list_jobs().unwrap().is_empty());
        assert!(matches!(h.scheduler.get_job("weekly"), Err(Error::NotFound(_))));
        h.scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_active_job() {
        let h = harness(one_account_client());
        h.scheduler.register(job("minutely", "* * * * *", true)).unwrap();

        for _ in 0..600 {
            if !h.runs.all().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        h.scheduler.shutdown().await;

        let runs = h.runs.all();
        assert!(!runs.is_empty());
        assert!(runs.iter().all(|r| r.job_id == "minutely"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_run_finish() {
        let h = harness(one_account_client().with_delay(Duration::from_millis(200)));
        h.scheduler.register(job("minutely", "* * * * *", true)).unwrap();

        for _ in 0..100_000 {
            if h.client.transaction_calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        h.scheduler.stop("minutely").unwrap();
        h.scheduler.shutdown().await;

        let runs = h.runs.all();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, SyncRunStatus::Completed);
        assert_eq!(runs[0].created, 1);
    }

    #[tokio::test]
    async fn test_runs_of_same_job_never_overlap() {
        let h = harness(one_account_client().with_delay(Duration::from_millis(50)));
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();

        let (first, second) = tokio::join!(
            h.scheduler.trigger_and_wait("daily-sync"),
            h.scheduler.trigger_and_wait("daily-sync")
        );

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(h.client.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.runs.all().len(), 2);
    }

    #[tokio::test]
    async fn test_different_jobs_run_concurrently() {
        let h = harness(one_account_client().with_delay(Duration::from_millis(50)));
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();
        h.scheduler.register(job("weekly", "0 3 * * 0", false)).unwrap();

        let (first, second) = tokio::join!(
            h.scheduler.trigger_and_wait("daily-sync"),
            h.scheduler.trigger_and_wait("weekly")
        );

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(h.client.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_linked_requisition_triggers_initial_sync() {
        let h = harness(one_account_client());
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();

        let triggered = h
            .scheduler
            .notify_accounts_linked(linked("req-1", &["acc-1"]))
            .await
            .unwrap();
        h.scheduler.shutdown().await;

        assert!(triggered);

        assert!(h.requisitions.get_by_id("req-1").unwrap().is_some());
        let runs = h.runs.all();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].job_id, "daily-sync");
    }

    #[tokio::test]
    async fn test_unlinked_requisition_is_stored_without_sync() {
        let h = harness(one_account_client());
        h.scheduler.register(job("daily-sync", "0 6 * * *", false)).unwrap();

        let triggered = h
            .scheduler
            .notify_accounts_linked(requisition("req-2", RequisitionStatus::Created, &[]))
            .await
            .unwrap();
        h.scheduler.shutdown().await;

        assert!(!triggered);
        assert!(h.requisitions.get_by_id("req-2").unwrap().is_some());
        assert!(h.runs.all().is_empty());
    }

    #[tokio::test]
    async fn test_linked_requisition_without_initial_job_is_kept() {
        let h = harness(one_account_client());

        let triggered = h
            .scheduler
            .notify_accounts_linked(linked("req-9", &["acc-1"]))
            .await
            .unwrap();
        h.scheduler.shutdown().await;

        assert!(!triggered);
        assert!(h.requisitions.get_by_id("req-9").unwrap().is_some());
        assert!(h.runs.all().is_empty());
    }
}
