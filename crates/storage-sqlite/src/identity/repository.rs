use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use std::sync::Arc;

use famledger_core::constants::SHARED_ORIGIN_NAME;
use famledger_core::errors::{DatabaseError, Error, Result, ValidationError};
use famledger_core::ledger::{BankIdentity, IdentityHint, IdentityResolverTrait};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{banks, origins};
use crate::utils::format_timestamp;

use super::model::{BankDB, Origin, OriginDB};

/// Banks keyed by institution id, plus the family origins accounts map to.
pub struct IdentityRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

/// Lowercase alphanumeric words of a name.
fn name_words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Origin whose name occurs as whole words in the account owner's name,
/// preferring the longest name; else the shared origin.
fn match_origin(origins: &[OriginDB], owner_name: Option<&str>) -> Option<String> {
    let owner = name_words(owner_name.unwrap_or_default());

    let member = origins
        .iter()
        .filter(|o| !o.is_shared && !owner.is_empty())
        .filter_map(|o| {
            let words = name_words(&o.name);
            let found = !words.is_empty()
                && owner.windows(words.len()).any(|window| window == words.as_slice());
            found.then(|| (words.iter().map(String::len).sum::<usize>(), o))
        })
        .max_by(|(a_len, a), (b_len, b)| a_len.cmp(b_len).then_with(|| b.name.cmp(&a.name)))
        .map(|(_, o)| o);

    member
        .or_else(|| origins.iter().find(|o| o.is_shared))
        .map(|o| o.id.clone())
}

fn find_or_create_bank(conn: &mut SqliteConnection, institution_id: &str) -> Result<String> {
    let existing = banks::table
        .filter(banks::institution_id.eq(institution_id))
        .select(banks::id)
        .first::<String>(conn)
        .optional()
        .map_err(StorageError::from)?;
    if let Some(bank_id) = existing {
        return Ok(bank_id);
    }

    let bank = BankDB {
        id: uuid::Uuid::new_v4().to_string(),
        institution_id: institution_id.to_string(),
        name: institution_id.to_string(),
        created_at: format_timestamp(Utc::now()),
    };
    diesel::insert_into(banks::table)
        .values(&bank)
        .execute(conn)
        .map_err(StorageError::from)?;
    info!("Created bank {} for institution {}", bank.id, institution_id);
    Ok(bank.id)
}

impl IdentityRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn list_origins(&self) -> Result<Vec<Origin>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = origins::table
            .order(origins::name.asc())
            .select(OriginDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(Origin::from).collect())
    }

    /// Register a family member; an existing name is returned unchanged.
    pub async fn ensure_origin(&self, name: &str) -> Result<Origin> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name".to_string()).into());
        }

        self.writer
            .exec(move |conn| {
                let existing = origins::table
                    .filter(origins::name.eq(&name))
                    .select(OriginDB::as_select())
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                if let Some(origin) = existing {
                    return Ok(origin.into());
                }

                let origin = OriginDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    name,
                    is_shared: false,
                    created_at: format_timestamp(Utc::now()),
                };
                diesel::insert_into(origins::table)
                    .values(&origin)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(origin.into())
            })
            .await
    }
}

#[async_trait]
impl IdentityResolverTrait for IdentityRepository {
    async fn resolve(&self, hint: &IdentityHint) -> Result<BankIdentity> {
        let mut conn = get_connection(&self.pool)?;
        let all_origins = origins::table
            .select(OriginDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        drop(conn);

        let origin_id = match_origin(&all_origins, hint.owner_name.as_deref()).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "shared origin '{}'",
                SHARED_ORIGIN_NAME
            )))
        })?;

        let institution_id = hint.institution_id.clone();
        let bank_id = self
            .writer
            .exec(move |conn| find_or_create_bank(conn, &institution_id))
            .await?;

        debug!(
            "Institution {} resolved to bank {} / origin {}",
            hint.institution_id, bank_id, origin_id
        );
        Ok(BankIdentity { bank_id, origin_id })
    }
}
