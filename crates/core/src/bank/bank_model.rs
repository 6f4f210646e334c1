//! Bank data domain models: consent records, accounts and raw transactions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::constants::DATE_FORMAT;
use crate::errors::{Error, Result};

/// Lifecycle of a bank consent (requisition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    /// Consent initiated, user has not finished authenticating
    #[default]
    Created,
    /// User authenticated; linked accounts can be synced
    Linked,
    /// Consent expired and must be renewed
    Expired,
    /// Rejected or suspended by the institution
    Error,
}

impl RequisitionStatus {
    /// Maps a provider status code (`LN`, `EX`, ...) or a long name onto a status.
    pub fn from_provider(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "LN" | "LINKED" => RequisitionStatus::Linked,
            "EX" | "EXPIRED" => RequisitionStatus::Expired,
            "RJ" | "SU" | "REJECTED" | "SUSPENDED" | "ERROR" => RequisitionStatus::Error,
            _ => RequisitionStatus::Created,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Created => "created",
            RequisitionStatus::Linked => "linked",
            RequisitionStatus::Expired => "expired",
            RequisitionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequisitionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(RequisitionStatus::Created),
            "linked" => Ok(RequisitionStatus::Linked),
            "expired" => Ok(RequisitionStatus::Expired),
            "error" => Ok(RequisitionStatus::Error),
            other => Err(Error::Unexpected(format!(
                "Unknown requisition status '{}'",
                other
            ))),
        }
    }
}

/// A bank's record of user consent to share account data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requisition {
    pub id: String,
    pub institution_id: String,
    pub status: RequisitionStatus,
    pub redirect_url: Option<String>,
    /// Our own reference, echoed back on the consent callback
    pub reference: Option<String>,
    /// Consent link the user must open to authenticate
    pub link: Option<String>,
    pub linked_account_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Requisition {
    pub fn is_linked(&self) -> bool {
        self.status == RequisitionStatus::Linked
    }
}

/// Input for creating a requisition with the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequisition {
    pub institution_id: String,
    pub redirect_url: String,
    pub reference: String,
}

/// Read-only mirror of a provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccount {
    pub id: String,
    pub institution_id: String,
    pub iban: Option<String>,
    pub currency: Option<String>,
    pub owner_name: Option<String>,
}

/// A bank supported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub bic: Option<String>,
    pub transaction_total_days: Option<u32>,
    pub countries: Vec<String>,
    pub logo: Option<String>,
}

/// One balance entry reported for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub amount: Decimal,
    pub currency: String,
    pub balance_type: String,
    pub reference_date: Option<NaiveDate>,
}

/// Transactions returned by one listing call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountTransactions {
    /// Booked transactions as raw provider payloads
    pub booked: Vec<Value>,
    /// Pending transactions; never reconciled
    pub pending: Vec<Value>,
}

/// A transaction as reported by the provider.
///
/// `transaction_id` is the provider's stable identifier and the idempotency
/// key for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransaction {
    pub transaction_id: String,
    pub booking_date: NaiveDate,
    /// Signed amount: positive is money in, negative is money out
    pub amount: Decimal,
    pub currency: String,
    pub counterparty_name: Option<String>,
    pub remittance_structured: Option<String>,
    pub remittance_unstructured: Option<String>,
    pub raw_payload: Value,
}

impl ExternalTransaction {
    /// Parses one booked transaction from the provider's JSON shape.
    ///
    /// Fails with [`Error::Mapping`] when the identifier, the booking date or
    /// the amount cannot be read.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let transaction_id = str_field(&payload, "transactionId")
            .or_else(|| str_field(&payload, "internalTransactionId"))
            .ok_or_else(|| Error::Mapping("transaction has no transactionId".to_string()))?;

        let booking_date = parse_date_field(&payload, "bookingDate")
            .or_else(|| parse_date_field(&payload, "valueDate"))
            .or_else(|| parse_date_field(&payload, "bookingDateTime"))
            .ok_or_else(|| {
                Error::Mapping(format!(
                    "transaction {} has no usable booking date",
                    transaction_id
                ))
            })?;

        let amount_node = payload.get("transactionAmount");
        let amount = amount_node
            .and_then(|a| a.get("amount"))
            .and_then(decimal_value)
            .ok_or_else(|| {
                Error::Mapping(format!(
                    "transaction {} has no parseable amount",
                    transaction_id
                ))
            })?;
        let currency = amount_node
            .and_then(|a| a.get("currency"))
            .and_then(Value::as_str)
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "EUR".to_string());

        // Debits name the creditor, credits name the debtor.
        let (primary, secondary) = if amount.is_sign_negative() {
            ("creditorName", "debtorName")
        } else {
            ("debtorName", "creditorName")
        };
        let counterparty_name =
            str_field(&payload, primary).or_else(|| str_field(&payload, secondary));

        let remittance_structured = str_field(&payload, "remittanceInformationStructured")
            .or_else(|| joined_array(&payload, "remittanceInformationStructuredArray"));
        let remittance_unstructured = str_field(&payload, "remittanceInformationUnstructured")
            .or_else(|| joined_array(&payload, "remittanceInformationUnstructuredArray"))
            .or_else(|| str_field(&payload, "additionalInformation"));

        Ok(Self {
            transaction_id,
            booking_date,
            amount,
            currency,
            counterparty_name,
            remittance_structured,
            remittance_unstructured,
            raw_payload: payload,
        })
    }

    /// Best-effort identifier for error reporting, usable on unparsed payloads.
    pub fn payload_ref(payload: &Value, position: usize) -> String {
        str_field(payload, "transactionId")
            .or_else(|| str_field(payload, "internalTransactionId"))
            .map(|id| format!("#{} ({})", position, id))
            .unwrap_or_else(|| format!("#{}", position))
    }
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn joined_array(payload: &Value, key: &str) -> Option<String> {
    let parts: Vec<&str> = payload
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn parse_date_field(payload: &Value, key: &str) -> Option<NaiveDate> {
    let raw = payload.get(key)?.as_str()?.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Reads a decimal that the provider may send as a string or as a number.
pub fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
