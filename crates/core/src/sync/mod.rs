//! Sync job scheduling rules and the run log.

mod recurrence;
mod sync_job_model;
mod sync_run_model;

pub use recurrence::RecurrenceRule;
pub use sync_job_model::*;
pub use sync_run_model::*;
