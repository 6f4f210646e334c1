//! SQLite storage implementation for category rules.

mod model;
mod repository;

pub use model::{CategoryRule, CategoryRuleDB, NewCategoryRule};
pub use repository::CategoryRuleRepository;
