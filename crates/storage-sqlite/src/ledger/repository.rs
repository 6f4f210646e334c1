use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;

use famledger_core::errors::{DatabaseError, Error, Result};
use famledger_core::ledger::{LedgerRepositoryTrait, LedgerTransaction, NewLedgerTransaction};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::ledger_transactions;
use crate::utils::format_timestamp;

use super::model::LedgerTransactionDB;

/// Ledger rows keyed by provider transaction id.
pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<LedgerTransaction>> {
        let mut conn = get_connection(&self.pool)?;

        ledger_transactions::table
            .filter(ledger_transactions::external_id.eq(external_id))
            .select(LedgerTransactionDB::as_select())
            .first(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(LedgerTransaction::try_from)
            .transpose()
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<LedgerTransaction>> {
        let mut conn = get_connection(&self.pool)?;

        ledger_transactions::table
            .order((
                ledger_transactions::date.desc(),
                ledger_transactions::created_at.desc(),
            ))
            .limit(limit)
            .select(LedgerTransactionDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(LedgerTransaction::try_from)
            .collect()
    }

    /// Inserts a new row. A duplicate external id surfaces as
    /// `DatabaseError::UniqueViolation` so the caller can retry as an update.
    async fn insert(&self, new_transaction: NewLedgerTransaction) -> Result<LedgerTransaction> {
        let transaction = new_transaction.into_transaction(Utc::now());
        self.writer
            .exec(move |conn| {
                let row: LedgerTransactionDB = transaction.clone().into();
                diesel::insert_into(ledger_transactions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!("Inserted ledger row for {}", transaction.external_id);
                Ok(transaction)
            })
            .await
    }

    /// Rewrites the row with the same external id; `id` and `created_at`
    /// are kept from the stored row.
    async fn update(&self, transaction: LedgerTransaction) -> Result<LedgerTransaction> {
        self.writer
            .exec(move |conn| {
                let mut row: LedgerTransactionDB = transaction.into();
                let (stored_id, stored_created_at) = ledger_transactions::table
                    .filter(ledger_transactions::external_id.eq(&row.external_id))
                    .select((ledger_transactions::id, ledger_transactions::created_at))
                    .first::<(String, String)>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                    .ok_or_else(|| {
                        Error::Database(DatabaseError::NotFound(format!(
                            "ledger transaction {}",
                            row.external_id
                        )))
                    })?;

                row.id = stored_id;
                row.created_at = stored_created_at;
                row.updated_at = format_timestamp(Utc::now());

                diesel::update(ledger_transactions::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                LedgerTransaction::try_from(row)
            })
            .await
    }
}
