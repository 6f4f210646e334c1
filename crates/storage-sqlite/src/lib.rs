//! SQLite storage implementation for famledger.
//!
//! This crate is the only place Diesel appears. It implements the repository
//! and collaborator traits defined in `famledger-core`:
//! - connection pooling, migrations and the single writer actor
//! - the ledger (unique on the provider transaction id)
//! - the local requisition mirror
//! - bank/origin identity resolution and category rules
//! - the append-only sync run log

pub mod db;
pub mod errors;
pub mod schema;
mod utils;

pub mod categories;
pub mod identity;
pub mod ledger;
pub mod requisitions;
pub mod sync;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

pub use errors::{IntoCore, StorageError};

pub use categories::CategoryRuleRepository;
pub use identity::IdentityRepository;
pub use ledger::LedgerRepository;
pub use requisitions::RequisitionRepository;
pub use sync::SyncRunRepository;

pub use famledger_core::errors::{DatabaseError, Error, Result};
