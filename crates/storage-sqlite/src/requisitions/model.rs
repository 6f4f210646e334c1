//! Database model for requisitions.

use chrono::Utc;
use diesel::prelude::*;

use famledger_core::bank::Requisition;
use famledger_core::errors::{Error, Result};

use crate::utils::{format_timestamp, parse_timestamp};

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::requisitions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct RequisitionDB {
    pub id: String,
    pub institution_id: String,
    pub status: String,
    pub redirect_url: Option<String>,
    pub reference: Option<String>,
    pub link: Option<String>,
    /// JSON array of provider account ids
    pub linked_account_ids: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<RequisitionDB> for Requisition {
    type Error = Error;

    fn try_from(db: RequisitionDB) -> Result<Self> {
        Ok(Self {
            status: db.status.parse()?,
            linked_account_ids: serde_json::from_str(&db.linked_account_ids)?,
            created_at: parse_timestamp("created_at", &db.created_at)?,
            id: db.id,
            institution_id: db.institution_id,
            redirect_url: db.redirect_url,
            reference: db.reference,
            link: db.link,
        })
    }
}

impl From<Requisition> for RequisitionDB {
    fn from(domain: Requisition) -> Self {
        Self {
            id: domain.id,
            institution_id: domain.institution_id,
            status: domain.status.as_str().to_string(),
            redirect_url: domain.redirect_url,
            reference: domain.reference,
            link: domain.link,
            linked_account_ids: serde_json::Value::from(domain.linked_account_ids).to_string(),
            created_at: format_timestamp(domain.created_at),
            updated_at: format_timestamp(Utc::now()),
        }
    }
}
