//! Database models for banks and origins.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Internal bank, one per provider institution
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::banks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BankDB {
    pub id: String,
    pub institution_id: String,
    pub name: String,
    pub created_at: String,
}

/// Family member or the shared origin
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::origins)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OriginDB {
    pub id: String,
    pub name: String,
    pub is_shared: bool,
    pub created_at: String,
}

/// An origin as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub id: String,
    pub name: String,
    pub is_shared: bool,
}

impl From<OriginDB> for Origin {
    fn from(db: OriginDB) -> Self {
        Self {
            id: db.id,
            name: db.name,
            is_shared: db.is_shared,
        }
    }
}
