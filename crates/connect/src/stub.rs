//! Sandbox provider returning deterministic data.
//!
//! Used when the server runs in stub mode and by integration tests. Ids are
//! derived from account and booking date so repeated runs see the same
//! transactions.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use log::debug;
use serde_json::json;
use std::sync::RwLock;

use famledger_core::bank::{
    AccountTransactions, Balance, ExternalAccount, Institution, NewRequisition, Requisition,
    RequisitionStatus,
};
use famledger_core::errors::{Error, Result};

use crate::sync::BankDataClient;

pub const STUB_INSTITUTION_ID: &str = "SANDBOXFINANCE_SFIN0000";
pub const STUB_REQUISITION_ID: &str = "stub-requisition-1";

/// Widest window the stub will generate, in days.
const MAX_STUB_DAYS: i64 = 90;
const DEFAULT_STUB_DAYS: i64 = 30;

/// (account id, IBAN, owner)
const STUB_ACCOUNTS: [(&str, &str, &str); 2] = [
    ("stub-account-1", "GL3343697694912188", "Jane Doe"),
    ("stub-account-2", "GL0865354374424724", "John Doe"),
];

const MERCHANTS: [&str; 4] = [
    "Corner Bakery",
    "City Transit",
    "Green Grocer",
    "Streamline Utilities",
];

/// Deterministic stand-in for the bank-data API.
pub struct StubBankDataClient {
    requisitions: RwLock<Vec<Requisition>>,
}

impl Default for StubBankDataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBankDataClient {
    /// A stub with one linked requisition covering both sandbox accounts.
    pub fn new() -> Self {
        let linked = Requisition {
            id: STUB_REQUISITION_ID.to_string(),
            institution_id: STUB_INSTITUTION_ID.to_string(),
            status: RequisitionStatus::Linked,
            redirect_url: None,
            reference: Some("stub-reference-1".to_string()),
            link: None,
            linked_account_ids: STUB_ACCOUNTS.iter().map(|(id, _, _)| id.to_string()).collect(),
            created_at: Utc::now(),
        };
        Self {
            requisitions: RwLock::new(vec![linked]),
        }
    }

    fn not_found(what: &str, id: &str) -> Error {
        Error::remote(404, format!("{} {} not found", what, id))
    }

    fn lock_error() -> Error {
        Error::Unexpected("stub requisition store poisoned".to_string())
    }

    fn stub_account(account_id: &str) -> Option<(&'static str, &'static str, &'static str)> {
        STUB_ACCOUNTS.iter().copied().find(|(id, _, _)| *id == account_id)
    }
}

/// One booked transaction per day; every seventh day is a salary credit.
fn booked_transaction(account_id: &str, day: NaiveDate) -> serde_json::Value {
    let ordinal = day.ordinal();
    let id = format!("{}-{}", account_id, day.format("%Y%m%d"));
    let date = day.format("%Y-%m-%d").to_string();

    if ordinal % 7 == 0 {
        json!({
            "transactionId": id,
            "bookingDate": date,
            "valueDate": date,
            "transactionAmount": { "amount": "1850.00", "currency": "EUR" },
            "debtorName": "ACME Payroll",
            "remittanceInformationUnstructured": "Salary"
        })
    } else {
        let merchant = MERCHANTS[(ordinal as usize) % MERCHANTS.len()];
        json!({
            "transactionId": id,
            "bookingDate": date,
            "valueDate": date,
            "transactionAmount": {
                "amount": format!("-{}.{:02}", ordinal % 40 + 3, (ordinal * 7) % 100),
                "currency": "EUR"
            },
            "creditorName": merchant,
            "remittanceInformationUnstructuredArray": ["CARD PAYMENT", merchant]
        })
    }
}

#[async_trait]
impl BankDataClient for StubBankDataClient {
    async fn list_institutions(&self, country: Option<&str>) -> Result<Vec<Institution>> {
        let all = vec![
            Institution {
                id: STUB_INSTITUTION_ID.to_string(),
                name: "Sandbox Finance".to_string(),
                bic: Some("SFIN0000".to_string()),
                transaction_total_days: Some(90),
                countries: vec!["GB".to_string(), "XX".to_string()],
                logo: None,
            },
            Institution {
                id: "SANDBOXBANK_DE_SBDE0000".to_string(),
                name: "Sandbox Bank Deutschland".to_string(),
                bic: Some("SBDE0000".to_string()),
                transaction_total_days: Some(540),
                countries: vec!["DE".to_string()],
                logo: None,
            },
        ];

        Ok(match country {
            Some(country) => all
                .into_iter()
                .filter(|i| i.countries.iter().any(|c| c.eq_ignore_ascii_case(country)))
                .collect(),
            None => all,
        })
    }

    async fn list_requisitions(&self) -> Result<Vec<Requisition>> {
        Ok(self
            .requisitions
            .read()
            .map_err(|_| Self::lock_error())?
            .clone())
    }

    /// Requisitions created through the stub are linked the first time they
    /// are fetched, as if the user completed the consent flow.
    async fn get_requisition(&self, requisition_id: &str) -> Result<Requisition> {
        let mut requisitions = self.requisitions.write().map_err(|_| Self::lock_error())?;
        let requisition = requisitions
            .iter_mut()
            .find(|r| r.id == requisition_id)
            .ok_or_else(|| Self::not_found("Requisition", requisition_id))?;

        if requisition.status == RequisitionStatus::Created {
            debug!("[Stub] Linking requisition {}", requisition.id);
            requisition.status = RequisitionStatus::Linked;
            requisition.linked_account_ids = vec![STUB_ACCOUNTS[0].0.to_string()];
        }
        Ok(requisition.clone())
    }

    async fn create_requisition(&self, request: &NewRequisition) -> Result<Requisition> {
        let id = format!("stub-requisition-{}", uuid::Uuid::new_v4().simple());
        let requisition = Requisition {
            link: Some(format!("https://sandbox.famledger.local/consent/{}", id)),
            id,
            institution_id: request.institution_id.clone(),
            status: RequisitionStatus::Created,
            redirect_url: Some(request.redirect_url.clone()),
            reference: Some(request.reference.clone()),
            linked_account_ids: Vec::new(),
            created_at: Utc::now(),
        };
        self.requisitions
            .write()
            .map_err(|_| Self::lock_error())?
            .push(requisition.clone());
        Ok(requisition)
    }

    async fn list_accounts(&self, requisition_id: &str) -> Result<Vec<String>> {
        Ok(self.get_requisition(requisition_id).await?.linked_account_ids)
    }

    async fn get_account(&self, account_id: &str) -> Result<ExternalAccount> {
        let (id, iban, owner) =
            Self::stub_account(account_id).ok_or_else(|| Self::not_found("Account", account_id))?;
        Ok(ExternalAccount {
            id: id.to_string(),
            institution_id: STUB_INSTITUTION_ID.to_string(),
            iban: Some(iban.to_string()),
            currency: Some("EUR".to_string()),
            owner_name: Some(owner.to_string()),
        })
    }

    async fn get_balances(&self, account_id: &str) -> Result<Vec<Balance>> {
        Self::stub_account(account_id).ok_or_else(|| Self::not_found("Account", account_id))?;
        let today = Utc::now().date_naive();
        Ok(vec![
            Balance {
                amount: rust_decimal::Decimal::new(152_033, 2),
                currency: "EUR".to_string(),
                balance_type: "closingBooked".to_string(),
                reference_date: Some(today - Duration::days(1)),
            },
            Balance {
                amount: rust_decimal::Decimal::new(148_790, 2),
                currency: "EUR".to_string(),
                balance_type: "interimAvailable".to_string(),
                reference_date: Some(today),
            },
        ])
    }

    async fn get_transactions(
        &self,
        account_id: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<AccountTransactions> {
        Self::stub_account(account_id).ok_or_else(|| Self::not_found("Account", account_id))?;

        let to = date_to.unwrap_or_else(|| Utc::now().date_naive());
        let earliest = to - Duration::days(MAX_STUB_DAYS);
        let from = date_from
            .unwrap_or(to - Duration::days(DEFAULT_STUB_DAYS))
            .max(earliest);

        let booked = from
            .iter_days()
            .take_while(|day| *day <= to)
            .map(|day| booked_transaction(account_id, day))
            .collect();
        let pending = vec![json!({
            "valueDate": to.format("%Y-%m-%d").to_string(),
            "transactionAmount": { "amount": "-4.20", "currency": "EUR" },
            "creditorName": "Corner Bakery",
            "remittanceInformationUnstructured": "PENDING CARD PAYMENT"
        })];

        Ok(AccountTransactions { booked, pending })
    }
}
