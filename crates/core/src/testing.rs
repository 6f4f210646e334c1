//! In-memory implementations of the repository and collaborator traits.
//!
//! Used by unit tests across the workspace (feature `test-utils`).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::bank::{Requisition, RequisitionRepositoryTrait, RequisitionStatus};
use crate::constants::SHARED_ORIGIN_NAME;
use crate::errors::{DatabaseError, Error, Result};
use crate::ledger::{
    BankIdentity, CategoryRequest, CategoryResolverTrait, CategorySuggestion, IdentityHint,
    IdentityResolverTrait, LedgerRepositoryTrait, LedgerTransaction, NewLedgerTransaction,
};
use crate::sync::{SyncRunRepositoryTrait, SyncRunResult};

/// Ledger kept in a map keyed by external id.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    rows: RwLock<HashMap<String, LedgerTransaction>>,
    failing_external_ids: RwLock<HashSet<String>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row as if a previous sync had stored it.
    pub fn seed(&self, new_transaction: NewLedgerTransaction) -> LedgerTransaction {
        let row = new_transaction.into_transaction(Utc::now());
        self.rows
            .write()
            .unwrap()
            .insert(row.external_id.clone(), row.clone());
        row
    }

    /// Make every insert/update for this external id fail with a storage error.
    pub fn fail_writes_for(&self, external_id: &str) {
        self.failing_external_ids
            .write()
            .unwrap()
            .insert(external_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, external_id: &str) -> Option<LedgerTransaction> {
        self.rows.read().unwrap().get(external_id).cloned()
    }

    fn check_writable(&self, external_id: &str) -> Result<()> {
        if self.failing_external_ids.read().unwrap().contains(external_id) {
            return Err(Error::Database(DatabaseError::QueryFailed(format!(
                "write rejected for {}",
                external_id
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<LedgerTransaction>> {
        Ok(self.get(external_id))
    }

    fn list_recent(&self, limit: i64) -> Result<Vec<LedgerTransaction>> {
        let mut rows: Vec<LedgerTransaction> = self.rows.read().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn insert(&self, new_transaction: NewLedgerTransaction) -> Result<LedgerTransaction> {
        self.check_writable(&new_transaction.external_id)?;
        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(&new_transaction.external_id) {
            return Err(Error::Database(DatabaseError::UniqueViolation(
                "ledger_transactions.external_id".to_string(),
            )));
        }
        let row = new_transaction.into_transaction(Utc::now());
        rows.insert(row.external_id.clone(), row.clone());
        Ok(row)
    }

    async fn update(&self, transaction: LedgerTransaction) -> Result<LedgerTransaction> {
        self.check_writable(&transaction.external_id)?;
        let mut rows = self.rows.write().unwrap();
        if !rows.contains_key(&transaction.external_id) {
            return Err(Error::Database(DatabaseError::NotFound(
                transaction.external_id.clone(),
            )));
        }
        rows.insert(transaction.external_id.clone(), transaction.clone());
        Ok(transaction)
    }
}

/// Requisition mirror kept in memory.
#[derive(Default)]
pub struct InMemoryRequisitionRepository {
    requisitions: RwLock<HashMap<String, Requisition>>,
}

impl InMemoryRequisitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequisitionRepositoryTrait for InMemoryRequisitionRepository {
    fn list(&self) -> Result<Vec<Requisition>> {
        let mut all: Vec<Requisition> = self
            .requisitions
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    fn list_by_status(&self, status: RequisitionStatus) -> Result<Vec<Requisition>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    fn get_by_id(&self, requisition_id: &str) -> Result<Option<Requisition>> {
        Ok(self.requisitions.read().unwrap().get(requisition_id).cloned())
    }

    fn get_by_reference(&self, reference: &str) -> Result<Option<Requisition>> {
        Ok(self
            .requisitions
            .read()
            .unwrap()
            .values()
            .find(|r| r.reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn upsert(&self, requisition: Requisition) -> Result<Requisition> {
        self.requisitions
            .write()
            .unwrap()
            .insert(requisition.id.clone(), requisition.clone());
        Ok(requisition)
    }
}

/// Append-only run log kept in memory.
#[derive(Default)]
pub struct InMemorySyncRunRepository {
    runs: RwLock<Vec<SyncRunResult>>,
}

impl InMemorySyncRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SyncRunResult> {
        self.runs.read().unwrap().clone()
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for InMemorySyncRunRepository {
    async fn append(&self, run: SyncRunResult) -> Result<SyncRunResult> {
        self.runs.write().unwrap().push(run.clone());
        Ok(run)
    }

    fn list_recent(&self, job_id: Option<&str>, limit: i64) -> Result<Vec<SyncRunResult>> {
        let mut runs: Vec<SyncRunResult> = self
            .runs
            .read()
            .unwrap()
            .iter()
            .filter(|r| job_id.map_or(true, |id| r.job_id == id))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }
}

/// Category resolver answering with a fixed suggestion, optionally per description.
pub struct StaticCategoryResolver {
    default: CategorySuggestion,
    by_description: HashMap<String, CategorySuggestion>,
    failing: bool,
}

impl StaticCategoryResolver {
    pub fn new(category_id: &str, confidence: f64) -> Self {
        Self {
            default: CategorySuggestion {
                category_id: Some(category_id.to_string()),
                confidence,
            },
            by_description: HashMap::new(),
            failing: false,
        }
    }

    /// A resolver whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new("unused", 0.0)
        }
    }

    pub fn with_description(mut self, description: &str, category_id: &str, confidence: f64) -> Self {
        self.by_description.insert(
            description.to_string(),
            CategorySuggestion {
                category_id: Some(category_id.to_string()),
                confidence,
            },
        );
        self
    }
}

#[async_trait]
impl CategoryResolverTrait for StaticCategoryResolver {
    async fn suggest(&self, request: &CategoryRequest) -> Result<CategorySuggestion> {
        if self.failing {
            return Err(Error::Unexpected("category model unavailable".to_string()));
        }
        Ok(self
            .by_description
            .get(&request.description)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Identity resolver with banks keyed by institution and a fixed family.
pub struct InMemoryIdentityResolver {
    family: Vec<String>,
    banks: RwLock<HashMap<String, String>>,
}

impl InMemoryIdentityResolver {
    /// `family` lists the origin names that can own accounts.
    pub fn new(family: &[&str]) -> Self {
        Self {
            family: family.iter().map(|s| s.to_string()).collect(),
            banks: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl IdentityResolverTrait for InMemoryIdentityResolver {
    async fn resolve(&self, hint: &IdentityHint) -> Result<BankIdentity> {
        let bank_id = self
            .banks
            .write()
            .unwrap()
            .entry(hint.institution_id.clone())
            .or_insert_with(|| format!("bank-{}", hint.institution_id.to_lowercase()))
            .clone();

        let owner = hint.owner_name.as_deref().unwrap_or_default().to_lowercase();
        let origin = self
            .family
            .iter()
            .find(|name| !owner.is_empty() && owner.contains(&name.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| SHARED_ORIGIN_NAME.to_string());

        Ok(BankIdentity {
            bank_id,
            origin_id: format!("origin-{}", origin.to_lowercase()),
        })
    }
}
