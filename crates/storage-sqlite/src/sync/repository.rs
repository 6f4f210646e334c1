use async_trait::async_trait;
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;

use famledger_core::errors::Result;
use famledger_core::sync::{SyncRunRepositoryTrait, SyncRunResult};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_runs;

use super::model::SyncRunDB;

/// Append-only log of sync runs.
pub struct SyncRunRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncRunRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    async fn append(&self, run: SyncRunResult) -> Result<SyncRunResult> {
        let row = SyncRunDB::try_from(run)?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_runs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!("Recorded sync run {} for job {}", row.id, row.job_id);
                SyncRunResult::try_from(row)
            })
            .await
    }

    fn list_recent(&self, job_id: Option<&str>, limit: i64) -> Result<Vec<SyncRunResult>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = sync_runs::table
            .select(SyncRunDB::as_select())
            .order(sync_runs::finished_at.desc())
            .limit(limit.max(0))
            .into_boxed();
        if let Some(job_id) = job_id {
            query = query.filter(sync_runs::job_id.eq(job_id.to_string()));
        }

        query
            .load(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(SyncRunResult::try_from)
            .collect()
    }
}
