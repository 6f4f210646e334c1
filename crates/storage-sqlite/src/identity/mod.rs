//! SQLite storage implementation for bank and origin identities.

mod model;
mod repository;

pub use model::{BankDB, Origin, OriginDB};
pub use repository::IdentityRepository;
