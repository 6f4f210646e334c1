//! Registration of the configured sync jobs with the scheduler.

use tracing::{info, warn};

use famledger_connect::SyncScheduler;
use famledger_core::errors::Result;
use famledger_core::sync::SyncJobDefinition;

/// Register every configured job; active jobs start their timers.
///
/// An invalid definition aborts start-up rather than silently dropping a job.
pub fn start_sync_scheduler(
    scheduler: &SyncScheduler,
    definitions: &[SyncJobDefinition],
) -> Result<()> {
    for definition in definitions {
        let job = scheduler.register(definition.clone().into_job()?)?;
        match job.next_run_at {
            Some(next_run) => info!("Sync job '{}' scheduled, next run at {}", job.id, next_run),
            None => info!("Sync job '{}' registered inactive", job.id),
        }
    }

    if definitions.iter().all(|d| !d.active) {
        warn!("No active sync jobs configured; syncs only run when triggered");
    }
    Ok(())
}
