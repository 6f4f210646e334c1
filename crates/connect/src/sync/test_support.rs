//! Scripted bank client shared by the sync tests.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use famledger_core::bank::{
    AccountTransactions, Balance, ExternalAccount, Institution, NewRequisition, Requisition,
    RequisitionStatus,
};
use famledger_core::errors::{Error, Result};

use super::traits::BankDataClient;

pub fn requisition(id: &str, status: RequisitionStatus, accounts: &[&str]) -> Requisition {
    Requisition {
        id: id.to_string(),
        institution_id: "SANDBOXFINANCE_SFIN0000".to_string(),
        status,
        redirect_url: None,
        reference: Some(format!("ref-{}", id)),
        link: None,
        linked_account_ids: accounts.iter().map(|a| a.to_string()).collect(),
        created_at: Utc::now(),
    }
}

pub fn linked(id: &str, accounts: &[&str]) -> Requisition {
    requisition(id, RequisitionStatus::Linked, accounts)
}

pub fn payload(id: &str, date: &str, amount: &str) -> Value {
    json!({
        "transactionId": id,
        "bookingDate": date,
        "transactionAmount": { "amount": amount, "currency": "EUR" },
        "creditorName": "Corner Bakery",
        "remittanceInformationUnstructured": format!("CARD PAYMENT {}", id)
    })
}

/// Provider double driven by per-account scripts.
///
/// Errors are not `Clone`, so scripted failures are rebuilt from their kind
/// and message on every call.
#[derive(Default)]
pub struct ScriptedBankClient {
    requisitions: Vec<Requisition>,
    transactions: HashMap<String, Vec<Value>>,
    account_errors: HashMap<String, (String, String)>,
    listing_error: Option<(String, String)>,
    delay: Option<Duration>,
    windows: Mutex<Vec<(String, Option<NaiveDate>, Option<NaiveDate>)>>,
    pub transaction_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

fn script_error(err: &Error) -> (String, String) {
    let message = match err {
        Error::Auth(m) | Error::Network(m) | Error::Mapping(m) | Error::Unexpected(m) => m.clone(),
        Error::Remote { body, .. } => body.clone(),
        other => other.to_string(),
    };
    (err.kind().to_string(), message)
}

fn replay_error((kind, message): &(String, String)) -> Error {
    match kind.as_str() {
        "auth" => Error::Auth(message.clone()),
        "network" => Error::Network(message.clone()),
        "mapping" => Error::Mapping(message.clone()),
        "remote" => Error::remote(500, message.clone()),
        _ => Error::Unexpected(message.clone()),
    }
}

impl ScriptedBankClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requisition(mut self, requisition: Requisition) -> Self {
        self.requisitions.push(requisition);
        self
    }

    pub fn with_transactions(mut self, account_id: &str, booked: Vec<Value>) -> Self {
        self.transactions.insert(account_id.to_string(), booked);
        self
    }

    pub fn with_account_error(mut self, account_id: &str, err: Error) -> Self {
        self.account_errors
            .insert(account_id.to_string(), script_error(&err));
        self
    }

    pub fn with_listing_error(mut self, err: Error) -> Self {
        self.listing_error = Some(script_error(&err));
        self
    }

    /// Delay every transaction listing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Accounts and windows requested from the transactions endpoint.
    pub fn transaction_windows(&self) -> Vec<(String, Option<NaiveDate>, Option<NaiveDate>)> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl BankDataClient for ScriptedBankClient {
    async fn list_institutions(&self, _country: Option<&str>) -> Result<Vec<Institution>> {
        Ok(Vec::new())
    }

    async fn list_requisitions(&self) -> Result<Vec<Requisition>> {
        match &self.listing_error {
            Some(err) => Err(replay_error(err)),
            None => Ok(self.requisitions.clone()),
        }
    }

    async fn get_requisition(&self, requisition_id: &str) -> Result<Requisition> {
        self.requisitions
            .iter()
            .find(|r| r.id == requisition_id)
            .cloned()
            .ok_or_else(|| Error::remote(404, "not found"))
    }

    async fn create_requisition(&self, request: &NewRequisition) -> Result<Requisition> {
        Ok(requisition(
            &format!("req-{}", request.reference),
            RequisitionStatus::Created,
            &[],
        ))
    }

    async fn list_accounts(&self, requisition_id: &str) -> Result<Vec<String>> {
        Ok(self.get_requisition(requisition_id).await?.linked_account_ids)
    }

    async fn get_account(&self, account_id: &str) -> Result<ExternalAccount> {
        if let Some(err) = self.account_errors.get(account_id) {
            return Err(replay_error(err));
        }
        Ok(ExternalAccount {
            id: account_id.to_string(),
            institution_id: "SANDBOXFINANCE_SFIN0000".to_string(),
            iban: None,
            currency: Some("EUR".to_string()),
            owner_name: None,
        })
    }

    async fn get_balances(&self, _account_id: &str) -> Result<Vec<Balance>> {
        Ok(Vec::new())
    }

    async fn get_transactions(
        &self,
        account_id: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<AccountTransactions> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .push((account_id.to_string(), date_from, date_to));
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(AccountTransactions {
            booked: self.transactions.get(account_id).cloned().unwrap_or_default(),
            pending: Vec::new(),
        })
    }
}
