use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::record::ScheduledCallRecord;

const REMINDERS_PATH: &str = "/customers/reminders";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no authentication token available")]
    MissingCredential,
    #[error("reminders endpoint denied access (HTTP {0})")]
    Unauthorized(StatusCode),
    #[error("reminders endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("failed requesting reminders: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reminders payload is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("reminders payload is not a json array")]
    NotAnArray,
}

impl FetchError {
    /// Whether the failure means "the backend has nothing for us" rather
    /// than "we could not find out". Views holding the last good list
    /// drop it only in the first case.
    pub fn means_empty(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::Unauthorized(_) | Self::NotAnArray
        )
    }
}

/// Anything that can produce the current list of scheduled calls.
pub trait ReminderSource: Send + Sync + 'static {
    fn fetch(
        &self,
    ) -> impl Future<Output = Result<Vec<ScheduledCallRecord>, FetchError>> + Send;
}

/// Supplies the bearer token. Consulted on every fetch, never cached.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        non_empty(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct EnvToken {
    pub var: String,
}

impl TokenSource for EnvToken {
    fn token(&self) -> Option<String> {
        non_empty(std::env::var(&self.var).ok())
    }
}

/// Token persisted by the login flow, one line in a file.
#[derive(Debug, Clone)]
pub struct FileToken {
    pub path: PathBuf,
}

impl TokenSource for FileToken {
    fn token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => non_empty(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "token file not found");
                None
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed reading token file");
                None
            }
        }
    }
}

/// First source that yields a token wins.
pub struct ChainedToken(pub Vec<Box<dyn TokenSource>>);

impl TokenSource for ChainedToken {
    fn token(&self) -> Option<String> {
        self.0.iter().find_map(|source| source.token())
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub struct HttpReminderFetcher {
    client: reqwest::Client,
    endpoint: String,
    tokens: Box<dyn TokenSource>,
}

impl HttpReminderFetcher {
    pub fn new(
        api_base: &str,
        tokens: Box<dyn TokenSource>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed building HTTP client for reminders")?;

        Ok(Self {
            client,
            endpoint: format!("{}{REMINDERS_PATH}", api_base.trim_end_matches('/')),
            tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn try_fetch(&self) -> Result<Vec<ScheduledCallRecord>, FetchError> {
        let Some(token) = self.tokens.token() else {
            return Err(FetchError::MissingCredential);
        };

        let response = self
            .client
            .get(self.endpoint.as_str())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(status));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        parse_reminder_payload(&body)
    }

    /// Never fails: every failure is logged and reads as "no reminders".
    pub async fn fetch_due_reminders(&self) -> Vec<ScheduledCallRecord> {
        match self.try_fetch().await {
            Ok(records) => records,
            Err(err) => {
                log_fetch_failure(&err);
                Vec::new()
            }
        }
    }
}

impl ReminderSource for HttpReminderFetcher {
    fn fetch(
        &self,
    ) -> impl Future<Output = Result<Vec<ScheduledCallRecord>, FetchError>> + Send {
        self.try_fetch()
    }
}

pub fn log_fetch_failure(err: &FetchError) {
    match err {
        FetchError::MissingCredential => warn!("no authentication token found; skipping reminders fetch"),
        FetchError::Unauthorized(status) => {
            warn!(%status, "reminders request unauthorized; treating as empty")
        }
        other => error!(error = %other, "error fetching reminders"),
    }
}

/// Array payloads keep every element that decodes; anything else is
/// rejected whole.
pub fn parse_reminder_payload(body: &str) -> Result<Vec<ScheduledCallRecord>, FetchError> {
    let Value::Array(items) = serde_json::from_str::<Value>(body)? else {
        return Err(FetchError::NotAnArray);
    };

    let total = items.len();
    let records: Vec<ScheduledCallRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            if !item.is_object() {
                debug!(index = idx, "skipping non-object reminder entry");
                return None;
            }
            match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(err) => {
                    debug!(index = idx, error = %err, "skipping undecodable reminder entry");
                    None
                }
            }
        })
        .collect();

    debug!(total, kept = records.len(), "parsed reminders payload");
    Ok(records)
}
