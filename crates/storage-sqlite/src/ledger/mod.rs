//! SQLite storage implementation for ledger transactions.

mod model;
mod repository;

pub use model::LedgerTransactionDB;
pub use repository::LedgerRepository;
