//! Ledger module - ledger rows, collaborator traits and the transaction reconciler.

mod ledger_model;
mod ledger_traits;
mod reconciler;


pub use ledger_model::{
    AccountContext, BankIdentity, CategoryRequest, CategorySuggestion, Flow, IdentityHint,
    LedgerTransaction, NewLedgerTransaction, ReconcileOutcome,
};
pub use ledger_traits::{CategoryResolverTrait, IdentityResolverTrait, LedgerRepositoryTrait};
pub use reconciler::{build_description, split_amount, TransactionReconciler};
