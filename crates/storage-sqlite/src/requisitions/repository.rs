use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use std::sync::Arc;

use famledger_core::bank::{Requisition, RequisitionRepositoryTrait, RequisitionStatus};
use famledger_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::requisitions;

use super::model::RequisitionDB;

pub struct RequisitionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl RequisitionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load(&self, rows: Vec<RequisitionDB>) -> Result<Vec<Requisition>> {
        rows.into_iter().map(Requisition::try_from).collect()
    }
}

#[async_trait]
impl RequisitionRepositoryTrait for RequisitionRepository {
    fn list(&self) -> Result<Vec<Requisition>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = requisitions::table
            .order(requisitions::created_at.asc())
            .select(RequisitionDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        self.load(rows)
    }

    fn list_by_status(&self, status: RequisitionStatus) -> Result<Vec<Requisition>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = requisitions::table
            .filter(requisitions::status.eq(status.as_str()))
            .order(requisitions::created_at.asc())
            .select(RequisitionDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        self.load(rows)
    }

    fn get_by_id(&self, requisition_id: &str) -> Result<Option<Requisition>> {
        let mut conn = get_connection(&self.pool)?;
        requisitions::table
            .find(requisition_id)
            .select(RequisitionDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(Requisition::try_from)
            .transpose()
    }

    fn get_by_reference(&self, reference: &str) -> Result<Option<Requisition>> {
        let mut conn = get_connection(&self.pool)?;
        requisitions::table
            .filter(requisitions::reference.eq(reference))
            .order(requisitions::created_at.desc())
            .select(RequisitionDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(Requisition::try_from)
            .transpose()
    }

    /// Insert or refresh the mirror row. The first-seen `created_at` wins.
    async fn upsert(&self, requisition: Requisition) -> Result<Requisition> {
        self.writer
            .exec(move |conn| {
                let row: RequisitionDB = requisition.into();
                diesel::insert_into(requisitions::table)
                    .values(&row)
                    .on_conflict(requisitions::id)
                    .do_update()
                    .set((
                        requisitions::institution_id.eq(excluded(requisitions::institution_id)),
                        requisitions::status.eq(excluded(requisitions::status)),
                        requisitions::redirect_url.eq(excluded(requisitions::redirect_url)),
                        requisitions::reference.eq(excluded(requisitions::reference)),
                        requisitions::link.eq(excluded(requisitions::link)),
                        requisitions::linked_account_ids
                            .eq(excluded(requisitions::linked_account_ids)),
                        requisitions::updated_at.eq(excluded(requisitions::updated_at)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let stored = requisitions::table
                    .find(&row.id)
                    .select(RequisitionDB::as_select())
                    .first(conn)
                    .map_err(StorageError::from)?;
                Requisition::try_from(stored)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;
    use chrono::{Duration, Utc};

    fn requisition(id: &str, status: RequisitionStatus, reference: &str) -> Requisition {
        Requisition {
            id: id.to_string(),
            institution_id: "SANDBOXFINANCE_SFIN0000".to_string(),
            status,
            redirect_url: Some("http://localhost:8080/api/v1/bank/callback".to_string()),
            reference: Some(reference.to_string()),
            link: Some(format!("https://consent.example/{}", id)),
            linked_account_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_refreshes_status_and_accounts() {
        let (pool, writer, _dir) = setup_db();
        let repo = RequisitionRepository::new(pool, writer);
        let created = repo
            .upsert(requisition("req-1", RequisitionStatus::Created, "ref-1"))
            .await
            .unwrap();

        let mut linked = created.clone();
        linked.status = RequisitionStatus::Linked;
        linked.linked_account_ids = vec!["acc-1".to_string(), "acc-2".to_string()];
        linked.created_at = created.created_at + Duration::days(3);
        let stored = repo.upsert(linked).await.unwrap();

        assert_eq!(stored.status, RequisitionStatus::Linked);
        assert_eq!(stored.linked_account_ids, vec!["acc-1", "acc-2"]);
        assert_eq!(stored.created_at, created.created_at);
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_reference_and_status() {
        let (pool, writer, _dir) = setup_db();
        let repo = RequisitionRepository::new(pool, writer);
        repo.upsert(requisition("req-1", RequisitionStatus::Linked, "ref-1"))
            .await
            .unwrap();
        repo.upsert(requisition("req-2", RequisitionStatus::Expired, "ref-2"))
            .await
            .unwrap();

        let by_ref = repo.get_by_reference("ref-2").unwrap().unwrap();
        assert_eq!(by_ref.id, "req-2");
        assert!(repo.get_by_reference("ref-9").unwrap().is_none());

        let linked = repo.list_by_status(RequisitionStatus::Linked).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, "req-1");
    }
}
