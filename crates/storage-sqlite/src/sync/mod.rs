//! SQLite storage implementation for the sync run log.

mod model;
mod repository;

pub use model::SyncRunDB;
pub use repository::SyncRunRepository;
