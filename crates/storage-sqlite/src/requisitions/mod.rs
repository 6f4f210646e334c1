//! SQLite storage implementation for the local requisition mirror.

mod model;
mod repository;

pub use model::RequisitionDB;
pub use repository::RequisitionRepository;
