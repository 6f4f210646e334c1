use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, LogFormat};
use crate::scheduler::start_sync_scheduler;
use famledger_connect::{
    create_bank_client, BankDataClient, LogProgressReporter, SyncConfig, SyncOrchestrator,
    SyncScheduler,
};
use famledger_core::bank::RequisitionRepositoryTrait;
use famledger_core::ledger::{LedgerRepositoryTrait, TransactionReconciler};
use famledger_storage_sqlite::{
    db, CategoryRuleRepository, IdentityRepository, LedgerRepository, RequisitionRepository,
    SyncRunRepository,
};

pub struct AppState {
    pub bank_client: Arc<dyn BankDataClient>,
    pub scheduler: SyncScheduler,
    pub requisitions: Arc<dyn RequisitionRepositoryTrait>,
    pub ledger: Arc<dyn LedgerRepositoryTrait>,
    pub category_rules: Arc<CategoryRuleRepository>,
    pub callback_url: String,
}

pub fn init_tracing(log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format == LogFormat::Json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone())?;

    let ledger = Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));
    let requisitions = Arc::new(RequisitionRepository::new(pool.clone(), writer.clone()));
    let identities = Arc::new(IdentityRepository::new(pool.clone(), writer.clone()));
    let category_rules = Arc::new(CategoryRuleRepository::new(pool.clone(), writer.clone()));
    let runs = Arc::new(SyncRunRepository::new(pool.clone(), writer.clone()));

    for member in &config.family_members {
        let origin = identities.ensure_origin(member).await?;
        tracing::debug!("Family member '{}' is origin {}", origin.name, origin.id);
    }

    let bank_client = create_bank_client(&config.provider)?;

    let reconciler = Arc::new(TransactionReconciler::new(
        ledger.clone(),
        category_rules.clone(),
        identities,
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        bank_client.clone(),
        reconciler,
        requisitions.clone(),
        Arc::new(LogProgressReporter),
        SyncConfig {
            account_timeout: config.account_timeout,
        },
    ));
    let scheduler = SyncScheduler::new(
        orchestrator,
        runs,
        requisitions.clone(),
        config.initial_sync_job.clone(),
    );
    start_sync_scheduler(&scheduler, &config.sync_jobs)?;

    if let Some(job_id) = &config.initial_sync_job {
        if scheduler.get_job(job_id).is_err() {
            tracing::warn!(
                "Initial sync job '{}' is not configured; linking accounts will not trigger a sync",
                job_id
            );
        }
    }

    Ok(Arc::new(AppState {
        bank_client,
        scheduler,
        requisitions,
        ledger,
        category_rules,
        callback_url: config.callback_url(),
    }))
}
