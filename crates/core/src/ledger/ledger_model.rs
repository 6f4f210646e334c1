//! Ledger domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// Direction of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flow {
    /// Money coming in (credit)
    In,
    /// Money going out (debit)
    Out,
}

impl Flow {
    /// Flow for a signed provider amount. Zero is booked as outgoing.
    pub fn from_signed(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Flow::In
        } else {
            Flow::Out
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::In => "IN",
            Flow::Out => "OUT",
        }
    }
}

impl FromStr for Flow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IN" => Ok(Flow::In),
            "OUT" => Ok(Flow::Out),
            other => Err(Error::Unexpected(format!("Unknown flow '{}'", other))),
        }
    }
}

/// A ledger row produced by reconciliation.
///
/// Exactly one of `income_amount` / `outgoing_amount` is set, matching `flow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub origin_id: String,
    pub bank_id: String,
    pub flow: Flow,
    pub category_id: String,
    pub description: String,
    pub income_amount: Option<Decimal>,
    pub outgoing_amount: Option<Decimal>,
    /// Provider transaction id; unique across the ledger
    pub external_id: String,
    pub raw_payload: Value,
    pub confidence: f64,
    /// Category came from the suggestion model rather than a fallback
    pub is_system_generated: bool,
    /// Confirmed by a family member
    pub is_validated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input model for inserting a ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerTransaction {
    pub id: Option<String>,
    pub date: NaiveDate,
    pub origin_id: String,
    pub bank_id: String,
    pub flow: Flow,
    pub category_id: String,
    pub description: String,
    pub income_amount: Option<Decimal>,
    pub outgoing_amount: Option<Decimal>,
    pub external_id: String,
    pub raw_payload: Value,
    pub confidence: f64,
    pub is_system_generated: bool,
    pub is_validated: bool,
}

impl NewLedgerTransaction {
    /// Materializes the row with a fresh id and timestamps.
    pub fn into_transaction(self, now: DateTime<Utc>) -> LedgerTransaction {
        LedgerTransaction {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            date: self.date,
            origin_id: self.origin_id,
            bank_id: self.bank_id,
            flow: self.flow,
            category_id: self.category_id,
            description: self.description,
            income_amount: self.income_amount,
            outgoing_amount: self.outgoing_amount,
            external_id: self.external_id,
            raw_payload: self.raw_payload,
            confidence: self.confidence,
            is_system_generated: self.is_system_generated,
            is_validated: self.is_validated,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Internal bank and origin (family member or shared) an account maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankIdentity {
    pub bank_id: String,
    pub origin_id: String,
}

/// Account metadata used to resolve a [`BankIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityHint {
    pub institution_id: String,
    pub iban: Option<String>,
    pub owner_name: Option<String>,
}

/// Everything the reconciler needs to know about the account being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub account_id: String,
    pub identity: BankIdentity,
}

/// Request sent to the category suggestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub description: String,
    /// Signed amount as booked by the bank
    pub amount: Decimal,
    pub counterparty: Option<String>,
    pub flow: Flow,
    pub date: NaiveDate,
}

/// Suggested category with the model's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySuggestion {
    pub category_id: Option<String>,
    pub confidence: f64,
}

/// Result of reconciling one external transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Created,
    Updated,
}
