//! HTTP client for the bank-data provider API.
//!
//! Every call obtains a bearer token from the shared [`TokenManager`]. A 401
//! drops the rejected token and the call is retried once with a fresh one.
//! Other non-2xx answers surface as [`Error::Remote`] and are never retried
//! here; transport failures and timeouts surface as [`Error::Network`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use famledger_core::bank::{
    decimal_value, AccountTransactions, Balance, ExternalAccount, Institution, NewRequisition,
    Requisition, RequisitionStatus,
};
use famledger_core::constants::DATE_FORMAT;
use famledger_core::errors::{Error, Result};

use crate::sync::BankDataClient;
use crate::token::TokenManager;

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default base URL of the bank-data API.
pub const DEFAULT_BANK_API_URL: &str = "https://bankaccountdata.gocardless.com/api/v2";

/// Upper bound on requisition pages followed through `next` links.
const MAX_REQUISITION_PAGES: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// API Response Types (internal, for parsing provider responses)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct ApiInstitution {
    id: String,
    name: String,
    #[serde(default)]
    bic: Option<String>,
    /// Sent as a string by the provider
    #[serde(default)]
    transaction_total_days: Option<Value>,
    #[serde(default)]
    countries: Vec<String>,
    #[serde(default)]
    logo: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiRequisitionPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<ApiRequisition>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiRequisition {
    id: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    redirect: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    institution_id: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    link: Option<String>,
}

impl From<ApiRequisition> for Requisition {
    fn from(r: ApiRequisition) -> Self {
        let created_at = r
            .created
            .as_deref()
            .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Requisition {
            id: r.id,
            institution_id: r.institution_id,
            status: RequisitionStatus::from_provider(&r.status),
            redirect_url: r.redirect,
            reference: r.reference,
            link: r.link,
            linked_account_ids: r.accounts,
            created_at,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiAccount {
    id: String,
    #[serde(default)]
    institution_id: String,
    #[serde(default)]
    iban: Option<String>,
    #[serde(default)]
    owner_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiAccountDetailsResponse {
    account: ApiAccountDetails,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAccountDetails {
    #[serde(default)]
    iban: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    owner_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiBalancesResponse {
    #[serde(default)]
    balances: Vec<ApiBalance>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiBalance {
    balance_amount: ApiAmount,
    #[serde(default)]
    balance_type: String,
    #[serde(default)]
    reference_date: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiAmount {
    amount: Value,
    #[serde(default)]
    currency: String,
}

#[derive(Debug, serde::Deserialize)]
struct ApiTransactionsResponse {
    transactions: AccountTransactions,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared request helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build the reqwest client used for provider calls.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Unexpected(format!("Failed to initialize HTTP client: {}", e)))
}

/// Send a request and return the body of a 2xx response.
pub(crate) async fn send_request(request: reqwest::RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::Network(format!("Request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(Error::remote(status.as_u16(), body));
    }
    Ok(body)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        Error::Mapping(format!(
            "Failed to parse response: {} - {}",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })
}

fn is_unauthorized(err: &Error) -> bool {
    matches!(err, Error::Remote { status_code: 401, .. })
}

// ─────────────────────────────────────────────────────────────────────────────
// Live client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the live bank-data API.
///
/// # Example
///
/// ```ignore
/// let endpoint = Arc::new(HttpTokenEndpoint::new(DEFAULT_BANK_API_URL, id, key, timeout)?);
/// let tokens = Arc::new(TokenManager::new(endpoint));
/// let client = LiveBankDataClient::new(DEFAULT_BANK_API_URL, tokens, timeout)?;
/// let requisitions = client.list_requisitions().await?;
/// ```
#[derive(Clone)]
pub struct LiveBankDataClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl LiveBankDataClient {
    pub fn new(base_url: &str, tokens: Arc<TokenManager>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue an authorized request, retrying once on 401 with a fresh token.
    async fn authorized<F>(&self, build: F) -> Result<String>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.tokens.get_access_token().await?;
        match send_request(build(&token)).await {
            Err(err) if is_unauthorized(&err) => {
                warn!("[BankData] Access token rejected, re-acquiring");
                self.tokens.invalidate(&token).await;
                let fresh = self.tokens.get_access_token().await?;
                match send_request(build(&fresh)).await {
                    Err(err) if is_unauthorized(&err) => {
                        self.tokens.invalidate(&fresh).await;
                        Err(Error::Auth(format!(
                            "Access token rejected after re-acquisition: {}",
                            err
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("[BankData] GET {}", url);
        let body = self
            .authorized(|token| self.client.get(url).bearer_auth(token))
            .await?;
        parse_body(&body)
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, payload: &Value) -> Result<T> {
        debug!("[BankData] POST {}", url);
        let body = self
            .authorized(|token| self.client.post(url).bearer_auth(token).json(payload))
            .await?;
        parse_body(&body)
    }

    /// Account details (currency, owner). Rate limited by most banks.
    async fn get_account_details(&self, account_id: &str) -> Result<ApiAccountDetails> {
        let response: ApiAccountDetailsResponse = self
            .get(&self.url(&format!("/accounts/{}/details/", account_id)))
            .await?;
        Ok(response.account)
    }
}

#[async_trait]
impl BankDataClient for LiveBankDataClient {
    async fn list_institutions(&self, country: Option<&str>) -> Result<Vec<Institution>> {
        let mut url = self.url("/institutions/");
        if let Some(country) = country.map(str::trim).filter(|c| !c.is_empty()) {
            url = format!("{}?country={}", url, urlencoding::encode(country));
        }

        let institutions: Vec<ApiInstitution> = self.get(&url).await?;
        info!("[BankData] Fetched {} institutions", institutions.len());

        Ok(institutions
            .into_iter()
            .map(|i| Institution {
                transaction_total_days: i.transaction_total_days.as_ref().and_then(|v| match v {
                    Value::String(s) => s.trim().parse().ok(),
                    Value::Number(n) => n.as_u64().and_then(|d| u32::try_from(d).ok()),
                    _ => None,
                }),
                id: i.id,
                name: i.name,
                bic: i.bic,
                countries: i.countries,
                logo: i.logo,
            })
            .collect())
    }

    async fn list_requisitions(&self) -> Result<Vec<Requisition>> {
        let mut requisitions = Vec::new();
        let mut next_url = Some(self.url("/requisitions/"));
        let mut pages = 0;

        while let Some(url) = next_url.take() {
            if pages >= MAX_REQUISITION_PAGES {
                warn!(
                    "[BankData] Requisition listing exceeded {} pages, stopping",
                    MAX_REQUISITION_PAGES
                );
                break;
            }
            let page: ApiRequisitionPage = self.get(&url).await?;
            pages += 1;
            requisitions.extend(page.results.into_iter().map(Requisition::from));
            next_url = page.next.filter(|n| !n.is_empty());
        }

        info!("[BankData] Fetched {} requisitions", requisitions.len());
        Ok(requisitions)
    }

    async fn get_requisition(&self, requisition_id: &str) -> Result<Requisition> {
        let requisition: ApiRequisition = self
            .get(&self.url(&format!("/requisitions/{}/", requisition_id)))
            .await?;
        Ok(requisition.into())
    }

    async fn create_requisition(&self, request: &NewRequisition) -> Result<Requisition> {
        let payload = serde_json::json!({
            "institution_id": request.institution_id,
            "redirect": request.redirect_url,
            "reference": request.reference,
        });
        let requisition: ApiRequisition = self.post(&self.url("/requisitions/"), &payload).await?;
        info!(
            "[BankData] Created requisition {} for {}",
            requisition.id, request.institution_id
        );
        Ok(requisition.into())
    }

    async fn list_accounts(&self, requisition_id: &str) -> Result<Vec<String>> {
        Ok(self.get_requisition(requisition_id).await?.linked_account_ids)
    }

    async fn get_account(&self, account_id: &str) -> Result<ExternalAccount> {
        let account: ApiAccount = self
            .get(&self.url(&format!("/accounts/{}/", account_id)))
            .await?;

        let details = match self.get_account_details(account_id).await {
            Ok(details) => Some(details),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    "[BankData] Details unavailable for account {}: {}",
                    account_id, err
                );
                None
            }
        };
        let (details_iban, currency, details_owner) = match details {
            Some(d) => (d.iban, d.currency, d.owner_name),
            None => (None, None, None),
        };

        Ok(ExternalAccount {
            id: account.id,
            institution_id: account.institution_id,
            iban: account.iban.or(details_iban),
            currency,
            owner_name: account.owner_name.or(details_owner),
        })
    }

    async fn get_balances(&self, account_id: &str) -> Result<Vec<Balance>> {
        let response: ApiBalancesResponse = self
            .get(&self.url(&format!("/accounts/{}/balances/", account_id)))
            .await?;

        response
            .balances
            .into_iter()
            .map(|b| {
                let amount = decimal_value(&b.balance_amount.amount).ok_or_else(|| {
                    Error::Mapping(format!("Unparseable balance amount for {}", account_id))
                })?;
                Ok(Balance {
                    amount,
                    currency: b.balance_amount.currency,
                    balance_type: b.balance_type,
                    reference_date: b
                        .reference_date
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok()),
                })
            })
            .collect()
    }

    async fn get_transactions(
        &self,
        account_id: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<AccountTransactions> {
        let mut url = self.url(&format!("/accounts/{}/transactions/", account_id));

        let mut params = Vec::new();
        if let Some(d) = date_from {
            params.push(format!("date_from={}", d.format(DATE_FORMAT)));
        }
        if let Some(d) = date_to {
            params.push(format!("date_to={}", d.format(DATE_FORMAT)));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let response: ApiTransactionsResponse = self.get(&url).await?;
        info!(
            "[BankData] Fetched {} booked / {} pending transactions for {}",
            response.transactions.booked.len(),
            response.transactions.pending.len(),
            account_id
        );
        Ok(response.transactions)
    }
}
