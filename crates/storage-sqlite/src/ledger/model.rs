//! Database model for ledger transactions.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use famledger_core::errors::{Error, Result};
use famledger_core::ledger::{Flow, LedgerTransaction};

use crate::utils::{format_date, format_timestamp, parse_date, parse_decimal, parse_timestamp};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Clone,
)]
#[diesel(table_name = crate::schema::ledger_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerTransactionDB {
    pub id: String,
    pub date: String,
    pub origin_id: String,
    pub bank_id: String,
    pub flow: String,
    pub category_id: String,
    pub description: String,
    pub income_amount: Option<String>,
    pub outgoing_amount: Option<String>,
    pub external_id: String,
    pub raw_payload: String,
    pub confidence: f64,
    pub is_system_generated: bool,
    pub is_validated: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<LedgerTransactionDB> for LedgerTransaction {
    type Error = Error;

    fn try_from(db: LedgerTransactionDB) -> Result<Self> {
        Ok(Self {
            date: parse_date("date", &db.date)?,
            flow: db.flow.parse::<Flow>()?,
            income_amount: parse_decimal("income_amount", db.income_amount.as_deref())?,
            outgoing_amount: parse_decimal("outgoing_amount", db.outgoing_amount.as_deref())?,
            raw_payload: serde_json::from_str(&db.raw_payload)?,
            created_at: parse_timestamp("created_at", &db.created_at)?,
            updated_at: parse_timestamp("updated_at", &db.updated_at)?,
            id: db.id,
            origin_id: db.origin_id,
            bank_id: db.bank_id,
            category_id: db.category_id,
            description: db.description,
            external_id: db.external_id,
            confidence: db.confidence,
            is_system_generated: db.is_system_generated,
            is_validated: db.is_validated,
        })
    }
}

impl From<LedgerTransaction> for LedgerTransactionDB {
    fn from(domain: LedgerTransaction) -> Self {
        Self {
            id: domain.id,
            date: format_date(domain.date),
            origin_id: domain.origin_id,
            bank_id: domain.bank_id,
            flow: domain.flow.as_str().to_string(),
            category_id: domain.category_id,
            description: domain.description,
            income_amount: domain.income_amount.map(|d| d.to_string()),
            outgoing_amount: domain.outgoing_amount.map(|d| d.to_string()),
            external_id: domain.external_id,
            raw_payload: domain.raw_payload.to_string(),
            confidence: domain.confidence,
            is_system_generated: domain.is_system_generated,
            is_validated: domain.is_validated,
            created_at: format_timestamp(domain.created_at),
            updated_at: format_timestamp(domain.updated_at),
        }
    }
}
