//! Sync job domain models.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::recurrence::RecurrenceRule;
use crate::errors::{Error, ValidationError};
use crate::Result;

/// Longest lookback a job may request, in days
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// A named sync job with its schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: String,
    pub name: String,
    pub recurrence_rule: RecurrenceRule,
    /// Days of history fetched on each run
    pub lookback_days: u32,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Inclusive `[today - lookback_days, today]` date window
    pub fn lookback_window(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let from = Duration::try_days(i64::from(self.lookback_days))
            .and_then(|span| today.checked_sub_signed(span))
            .ok_or_else(|| lookback_out_of_range(self.lookback_days))?;
        Ok((from, today))
    }

    /// Recompute `next_run_at` from the rule; cleared while inactive.
    pub fn schedule_from(&mut self, now: DateTime<Utc>) {
        self.next_run_at = if self.is_active {
            self.recurrence_rule.next_after(now)
        } else {
            None
        };
    }
}

/// Job definition as read from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Cron expression, e.g. `0 6 * * *`
    pub schedule: String,
    pub lookback_days: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SyncJobDefinition {
    pub fn new(id: &str, name: &str, schedule: &str, lookback_days: u32, active: bool) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            schedule: schedule.to_string(),
            lookback_days,
            active,
        }
    }

    /// Validate and turn into a registrable job
    pub fn into_job(self) -> Result<SyncJob> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "id".to_string(),
            )));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(lookback_out_of_range(self.lookback_days));
        }
        let recurrence_rule = RecurrenceRule::parse(&self.schedule)?;
        Ok(SyncJob {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            recurrence_rule,
            lookback_days: self.lookback_days,
            is_active: self.active,
            last_run_at: None,
            next_run_at: None,
        })
    }
}

fn lookback_out_of_range(days: u32) -> Error {
    Error::Validation(ValidationError::InvalidInput(format!(
        "lookbackDays {} exceeds the maximum of {}",
        days, MAX_LOOKBACK_DAYS
    )))
}

/// The jobs a fresh install runs with
pub fn default_job_definitions() -> Vec<SyncJobDefinition> {
    vec![
        SyncJobDefinition::new("frequent-sync", "Frequent sync", "0 */4 * * *", 1, false),
        SyncJobDefinition::new("daily-sync", "Daily sync", "0 6 * * *", 2, true),
        SyncJobDefinition::new(
            "weekly-reconciliation",
            "Weekly reconciliation",
            "0 3 * * 0",
            90,
            true,
        ),
    ]
}
