//! Text encodings shared by the row models.
//!
//! SQLite has no native timestamp or decimal type, so both are stored as
//! text. Timestamps use a fixed-width RFC 3339 form so that ordering by the
//! column is chronological.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use famledger_core::constants::DATE_FORMAT;
use famledger_core::errors::{DatabaseError, Error, Result};

fn corrupt(column: &str, value: &str, reason: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::Internal(format!(
        "Stored {} '{}' is invalid: {}",
        column, value, reason
    )))
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(column, value, e))
}

pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn parse_date(column: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| corrupt(column, value, e))
}

pub fn parse_decimal(column: &str, value: Option<&str>) -> Result<Option<Decimal>> {
    value
        .map(|v| Decimal::from_str(v).map_err(|e| corrupt(column, v, e)))
        .transpose()
}
