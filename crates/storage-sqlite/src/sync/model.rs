//! Database model for sync runs.

use diesel::prelude::*;

use famledger_core::errors::{Error, Result};
use famledger_core::sync::SyncRunResult;

use crate::utils::{format_timestamp, parse_timestamp};

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub job_id: String,
    pub status: String,
    pub accounts_processed: i32,
    pub transactions_processed: i32,
    pub created: i32,
    pub updated: i32,
    pub failed: i32,
    /// JSON array of recorded errors
    pub errors: String,
    pub started_at: String,
    pub finished_at: String,
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

fn column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TryFrom<SyncRunDB> for SyncRunResult {
    type Error = Error;

    fn try_from(db: SyncRunDB) -> Result<Self> {
        Ok(Self {
            status: db.status.parse()?,
            errors: serde_json::from_str(&db.errors)?,
            started_at: parse_timestamp("started_at", &db.started_at)?,
            timestamp: parse_timestamp("finished_at", &db.finished_at)?,
            accounts_processed: count(db.accounts_processed),
            transactions_processed: count(db.transactions_processed),
            created: count(db.created),
            updated: count(db.updated),
            failed: count(db.failed),
            id: db.id,
            job_id: db.job_id,
        })
    }
}

impl TryFrom<SyncRunResult> for SyncRunDB {
    type Error = Error;

    fn try_from(run: SyncRunResult) -> Result<Self> {
        Ok(Self {
            errors: serde_json::to_string(&run.errors)?,
            status: run.status.as_str().to_string(),
            accounts_processed: column(run.accounts_processed),
            transactions_processed: column(run.transactions_processed),
            created: column(run.created),
            updated: column(run.updated),
            failed: column(run.failed),
            started_at: format_timestamp(run.started_at),
            finished_at: format_timestamp(run.timestamp),
            id: run.id,
            job_id: run.job_id,
        })
    }
}
