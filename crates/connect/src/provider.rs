//! Provider selection, made once at start-up.

use log::info;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use famledger_core::errors::{Error, Result};

use crate::client::LiveBankDataClient;
use crate::stub::StubBankDataClient;
use crate::sync::BankDataClient;
use crate::token::{HttpTokenEndpoint, TokenManager};

/// Which bank-data provider backs the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Live,
    #[default]
    Stub,
}

impl FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(ProviderMode::Live),
            "stub" => Ok(ProviderMode::Stub),
            other => Err(Error::Config(format!(
                "Unknown provider mode '{}' (expected 'live' or 'stub')",
                other
            ))),
        }
    }
}

/// Settings needed to build a provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub mode: ProviderMode,
    pub base_url: String,
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub request_timeout: Duration,
}

/// Build the bank-data client for the configured mode.
///
/// Live mode without both secrets is a configuration error; there is no
/// silent fallback to the stub.
pub fn create_bank_client(settings: &ProviderSettings) -> Result<Arc<dyn BankDataClient>> {
    match settings.mode {
        ProviderMode::Stub => {
            info!("[BankData] Using sandbox stub provider");
            Ok(Arc::new(StubBankDataClient::new()))
        }
        ProviderMode::Live => {
            let secret_id = required_secret(settings.secret_id.as_deref(), "secret id")?;
            let secret_key = required_secret(settings.secret_key.as_deref(), "secret key")?;
            let endpoint = HttpTokenEndpoint::new(
                &settings.base_url,
                secret_id,
                secret_key,
                settings.request_timeout,
            )?;
            let tokens = Arc::new(TokenManager::new(Arc::new(endpoint)));
            info!("[BankData] Using live provider at {}", settings.base_url);
            Ok(Arc::new(LiveBankDataClient::new(
                &settings.base_url,
                tokens,
                settings.request_timeout,
            )?))
        }
    }
}

fn required_secret<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("Live provider mode requires a {}", name)))
}
