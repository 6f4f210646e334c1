//! Bearer-token lifecycle for the bank-data API.
//!
//! The [`TokenManager`] owns the only copy of the token pair. It hands out a
//! cached access token while it is comfortably valid, refreshes it through
//! the refresh token when possible, and falls back to a full acquisition with
//! the configured secrets otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use famledger_core::errors::{Error, Result};

use crate::client::{build_http_client, send_request};

/// Tokens expiring within this window are treated as already expired.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// Longest lifetime accepted from a grant; longer values are cut to this.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Current token pair. Replaced as a whole, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl TokenState {
    /// Build the next state from a grant, carrying over the refresh token
    /// when the grant did not include a new one.
    fn from_grant(
        grant: TokenGrant,
        previous: Option<&TokenState>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (refresh_token, refresh_expires_at) = match grant.refresh {
            Some(refresh) => (
                Some(refresh),
                grant
                    .refresh_expires
                    .map(|secs| expiry_after(now, secs))
                    .transpose()?,
            ),
            None => (
                previous.and_then(|p| p.refresh_token.clone()),
                previous.and_then(|p| p.refresh_expires_at),
            ),
        };

        Ok(Self {
            access_token: grant.access,
            refresh_token,
            access_expires_at: expiry_after(now, grant.access_expires)?,
            refresh_expires_at,
            last_updated_at: now,
        })
    }

    fn access_valid(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.access_expires_at - margin > now
    }

    fn usable_refresh_token(&self, now: DateTime<Utc>, margin: Duration) -> Option<&str> {
        match (&self.refresh_token, self.refresh_expires_at) {
            (Some(token), Some(expires_at)) if expires_at - margin > now => Some(token),
            _ => None,
        }
    }
}

/// `now` plus a provider-supplied lifetime, clamped to `[0, MAX_TOKEN_LIFETIME_SECS]`.
fn expiry_after(now: DateTime<Utc>, lifetime_secs: i64) -> Result<DateTime<Utc>> {
    let secs = lifetime_secs.clamp(0, MAX_TOKEN_LIFETIME_SECS);
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| Error::Auth(format!("token lifetime of {}s is out of range", lifetime_secs)))
}

/// Token payload as returned by the provider's token endpoints.
///
/// Lifetimes are in seconds. The refresh endpoint only returns a new access
/// token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access: String,
    pub access_expires: i64,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub refresh_expires: Option<i64>,
}

/// The provider side of the token exchange.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Full acquisition with the configured secrets.
    async fn obtain(&self) -> Result<TokenGrant>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Token endpoint over HTTP (`/token/new/` and `/token/refresh/`).
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    base_url: String,
    secret_id: String,
    secret_key: String,
}

impl HttpTokenEndpoint {
    pub fn new(
        base_url: &str,
        secret_id: &str,
        secret_key: &str,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<TokenGrant> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[BankData] POST {}", url);
        let request = self.client.post(&url).json(&body);
        let body = send_request(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Mapping(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn obtain(&self) -> Result<TokenGrant> {
        self.post(
            "/token/new/",
            serde_json::json!({
                "secret_id": self.secret_id,
                "secret_key": self.secret_key,
            }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.post(
            "/token/refresh/",
            serde_json::json!({ "refresh": refresh_token }),
        )
        .await
    }
}

/// Caches and renews the bearer token.
///
/// The state lock is held across any exchange, so concurrent callers wait for
/// the one in-flight acquisition and then reuse its token.
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    state: Mutex<Option<TokenState>>,
    margin: Duration,
}

impl TokenManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            endpoint,
            state: Mutex::new(None),
            margin: Duration::seconds(TOKEN_SAFETY_MARGIN_SECS),
        }
    }

    /// A valid access token, refreshing or re-acquiring as needed.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let refresh_token = match state.as_ref() {
            Some(current) if current.access_valid(now, self.margin) => {
                return Ok(current.access_token.clone());
            }
            Some(current) => current
                .usable_refresh_token(now, self.margin)
                .map(str::to_string),
            None => None,
        };

        if let Some(refresh_token) = refresh_token {
            match self.endpoint.refresh(&refresh_token).await {
                Ok(grant) => {
                    let next = TokenState::from_grant(grant, state.as_ref(), Utc::now())?;
                    debug!("[BankData] Access token refreshed");
                    let token = next.access_token.clone();
                    *state = Some(next);
                    return Ok(token);
                }
                Err(err) => {
                    warn!(
                        "[BankData] Token refresh failed, acquiring a new token: {}",
                        err
                    );
                }
            }
        }

        let grant = self.acquire().await?;
        let next = TokenState::from_grant(grant, None, Utc::now())?;
        info!(
            "[BankData] Acquired new access token (expires {})",
            next.access_expires_at
        );
        let token = next.access_token.clone();
        *state = Some(next);
        Ok(token)
    }

    /// Drop the cached state if it still holds the rejected token.
    ///
    /// A token that was already replaced by another caller is left alone.
    pub async fn invalidate(&self, rejected_token: &str) {
        let mut state = self.state.lock().await;
        if state
            .as_ref()
            .is_some_and(|current| current.access_token == rejected_token)
        {
            debug!("[BankData] Dropping rejected access token");
            *state = None;
        }
    }

    /// Snapshot of the cached state.
    pub async fn current_state(&self) -> Option<TokenState> {
        self.state.lock().await.clone()
    }

    /// Full acquisition, retried once.
    async fn acquire(&self) -> Result<TokenGrant> {
        match self.endpoint.obtain().await {
            Ok(grant) => Ok(grant),
            Err(first) => {
                warn!("[BankData] Token acquisition failed, retrying: {}", first);
                self.endpoint
                    .obtain()
                    .await
                    .map_err(|second| Error::Auth(format!("Token acquisition failed: {}", second)))
            }
        }
    }
}
