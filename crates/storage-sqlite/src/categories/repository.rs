use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;

use famledger_core::errors::Result;
use famledger_core::ledger::{CategoryRequest, CategoryResolverTrait, CategorySuggestion};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::category_rules;
use crate::utils::format_timestamp;

use super::model::{CategoryRule, CategoryRuleDB, NewCategoryRule};

/// Prefix rules used as the category suggestion source.
pub struct CategoryRuleRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl CategoryRuleRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn list_rules(&self) -> Result<Vec<CategoryRule>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = category_rules::table
            .order(category_rules::pattern.asc())
            .select(CategoryRuleDB::as_select())
            .load(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(CategoryRule::from).collect())
    }

    pub async fn add_rule(&self, rule: NewCategoryRule) -> Result<CategoryRule> {
        rule.validate()?;
        self.writer
            .exec(move |conn| {
                let row = CategoryRuleDB {
                    id: uuid::Uuid::new_v4().to_string(),
                    pattern: rule.pattern.trim().to_string(),
                    category_id: rule.category_id.trim().to_string(),
                    confidence: rule.confidence,
                    created_at: format_timestamp(Utc::now()),
                };
                diesel::insert_into(category_rules::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(row.into())
            })
            .await
    }
}

/// The longest matching pattern wins, checked against the description and
/// then the counterparty.
fn best_match<'a>(rules: &'a [CategoryRule], request: &CategoryRequest) -> Option<&'a CategoryRule> {
    let texts = std::iter::once(request.description.as_str()).chain(request.counterparty.as_deref());
    let candidates: Vec<&str> = texts.collect();

    rules
        .iter()
        .filter(|rule| candidates.iter().any(|text| rule.matches(text)))
        .max_by_key(|rule| rule.pattern.len())
}

#[async_trait]
impl CategoryResolverTrait for CategoryRuleRepository {
    async fn suggest(&self, request: &CategoryRequest) -> Result<CategorySuggestion> {
        let rules = self.list_rules()?;
        Ok(match best_match(&rules, request) {
            Some(rule) => CategorySuggestion {
                category_id: Some(rule.category_id.clone()),
                confidence: rule.confidence,
            },
            None => CategorySuggestion {
                category_id: None,
                confidence: 0.0,
            },
        })
    }
}
