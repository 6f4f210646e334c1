//! Process configuration read from `FL_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use famledger_connect::sync::DEFAULT_ACCOUNT_TIMEOUT_SECS;
use famledger_connect::{ProviderMode, ProviderSettings, DEFAULT_BANK_API_URL, DEFAULT_TIMEOUT_SECS};
use famledger_core::errors::{Error, Result};
use famledger_core::sync::{default_job_definitions, SyncJobDefinition};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DB_PATH: &str = "./db/app.db";
const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
const DEFAULT_INITIAL_SYNC_JOB: &str = "daily-sync";

/// Output format of the process log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!(
                "FL_LOG_FORMAT must be 'text' or 'json', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_format: LogFormat,
    pub db_path: String,
    /// Base URL the bank redirects the user back to after consent
    pub public_url: String,
    pub provider: ProviderSettings,
    pub sync_jobs: Vec<SyncJobDefinition>,
    /// Job triggered once a requisition becomes linked; `None` disables it
    pub initial_sync_job: Option<String>,
    pub account_timeout: Duration,
    /// Family members that own accounts, matched against account owner names
    pub family_members: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match non_empty(value) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

impl Config {
    /// Read the process environment, after loading a `.env` file if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_raw =
            non_empty(lookup("FL_LISTEN_ADDR")).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_raw.parse().map_err(|_| {
            Error::Config(format!("FL_LISTEN_ADDR is not a socket address: '{}'", listen_raw))
        })?;

        let log_format = match non_empty(lookup("FL_LOG_FORMAT")) {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        let timeout_ms = parse_number(
            "FL_REQUEST_TIMEOUT_MS",
            lookup("FL_REQUEST_TIMEOUT_MS"),
            DEFAULT_TIMEOUT_SECS * 1000,
        )?;
        let mode = match non_empty(lookup("FL_PROVIDER_MODE")) {
            Some(raw) => raw.parse::<ProviderMode>()?,
            None => ProviderMode::default(),
        };
        let provider = ProviderSettings {
            mode,
            base_url: non_empty(lookup("FL_BANK_API_URL"))
                .unwrap_or_else(|| DEFAULT_BANK_API_URL.to_string()),
            secret_id: non_empty(lookup("FL_BANK_SECRET_ID")),
            secret_key: non_empty(lookup("FL_BANK_SECRET_KEY")),
            request_timeout: Duration::from_millis(timeout_ms),
        };

        let sync_jobs = match non_empty(lookup("FL_SYNC_JOBS")) {
            Some(raw) => serde_json::from_str::<Vec<SyncJobDefinition>>(&raw)
                .map_err(|e| Error::Config(format!("FL_SYNC_JOBS is not valid: {}", e)))?,
            None => default_job_definitions(),
        };

        let initial_sync_job = match lookup("FL_INITIAL_SYNC_JOB") {
            Some(raw) => non_empty(Some(raw)),
            None => Some(DEFAULT_INITIAL_SYNC_JOB.to_string()),
        };

        let account_timeout_secs = parse_number(
            "FL_ACCOUNT_TIMEOUT_SECS",
            lookup("FL_ACCOUNT_TIMEOUT_SECS"),
            DEFAULT_ACCOUNT_TIMEOUT_SECS,
        )?;

        let family_members = lookup("FL_FAMILY_MEMBERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            log_format,
            db_path: non_empty(lookup("FL_DB_PATH")).unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            public_url: non_empty(lookup("FL_PUBLIC_URL"))
                .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            provider,
            sync_jobs,
            initial_sync_job,
            account_timeout: Duration::from_secs(account_timeout_secs),
            family_members,
        })
    }

    /// Where the consent flow sends the user back to.
    pub fn callback_url(&self) -> String {
        format!("{}/api/v1/bank/callback", self.public_url)
    }
}
