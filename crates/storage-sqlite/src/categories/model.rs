//! Category rules: a case-insensitive prefix mapped to a category.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use famledger_core::errors::{Result, ValidationError};

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::category_rules)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CategoryRuleDB {
    pub id: String,
    pub pattern: String,
    pub category_id: String,
    pub confidence: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRule {
    pub id: String,
    /// Descriptions or counterparties starting with this text match
    pub pattern: String,
    pub category_id: String,
    pub confidence: f64,
}

impl CategoryRule {
    /// Whether `text` starts with the pattern, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        text.trim()
            .to_lowercase()
            .starts_with(&self.pattern.to_lowercase())
    }
}

impl From<CategoryRuleDB> for CategoryRule {
    fn from(db: CategoryRuleDB) -> Self {
        Self {
            id: db.id,
            pattern: db.pattern,
            category_id: db.category_id,
            confidence: db.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategoryRule {
    pub pattern: String,
    pub category_id: String,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f64,
}

fn default_rule_confidence() -> f64 {
    0.9
}

impl NewCategoryRule {
    pub fn validate(&self) -> Result<()> {
        if self.pattern.trim().is_empty() {
            return Err(ValidationError::MissingField("pattern".to_string()).into());
        }
        if self.category_id.trim().is_empty() {
            return Err(ValidationError::MissingField("categoryId".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::InvalidInput(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            ))
            .into());
        }
        Ok(())
    }
}
