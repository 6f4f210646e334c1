//! Traits defining the contract for bank-data access.

use async_trait::async_trait;
use chrono::NaiveDate;

use famledger_core::bank::{
    AccountTransactions, Balance, ExternalAccount, Institution, NewRequisition, Requisition,
};
use famledger_core::errors::Result;

/// Trait for fetching data from the bank-data provider
///
/// Implemented by the live HTTP client and by the sandbox stub.
#[async_trait]
pub trait BankDataClient: Send + Sync {
    /// Institutions available for consent, optionally for one country (ISO 3166 alpha-2)
    async fn list_institutions(&self, country: Option<&str>) -> Result<Vec<Institution>>;

    /// Every requisition known to the provider
    async fn list_requisitions(&self) -> Result<Vec<Requisition>>;

    /// Fetch one requisition with its current status
    async fn get_requisition(&self, requisition_id: &str) -> Result<Requisition>;

    /// Start a consent flow; the returned requisition carries the consent link
    async fn create_requisition(&self, request: &NewRequisition) -> Result<Requisition>;

    /// Account ids linked through a requisition
    async fn list_accounts(&self, requisition_id: &str) -> Result<Vec<String>>;

    /// Account metadata (institution, IBAN, currency, owner)
    async fn get_account(&self, account_id: &str) -> Result<ExternalAccount>;

    async fn get_balances(&self, account_id: &str) -> Result<Vec<Balance>>;

    /// Booked and pending transactions in an inclusive date window
    async fn get_transactions(
        &self,
        account_id: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<AccountTransactions>;
}
