use crate::errors::Result;
use crate::ledger::ledger_model::{
    BankIdentity, CategoryRequest, CategorySuggestion, IdentityHint, LedgerTransaction,
    NewLedgerTransaction,
};
use async_trait::async_trait;

/// Trait for ledger storage operations
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<LedgerTransaction>>;
    fn list_recent(&self, limit: i64) -> Result<Vec<LedgerTransaction>>;
    async fn insert(&self, new_transaction: NewLedgerTransaction) -> Result<LedgerTransaction>;
    async fn update(&self, transaction: LedgerTransaction) -> Result<LedgerTransaction>;
}

/// Category suggestion collaborator (the model behind it is out of scope)
#[async_trait]
pub trait CategoryResolverTrait: Send + Sync {
    async fn suggest(&self, request: &CategoryRequest) -> Result<CategorySuggestion>;
}

/// Lookup-or-create of internal bank and origin identities
#[async_trait]
pub trait IdentityResolverTrait: Send + Sync {
    async fn resolve(&self, hint: &IdentityHint) -> Result<BankIdentity>;
}
