use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{FetchError, STATUS_OK};
use crate::models::{Change, ChangeStatus, Credentials};

/// Gerrit prefixes JSON bodies with this guard against cross-site inclusion.
const XSSI_PREFIX_LEN: usize = 4;

/// Raw shape of a `ChangeInfo` entity returned by `/changes/`.
#[derive(Debug, Deserialize)]
struct GerritChangeInfo {
    #[serde(rename = "_number")]
    number: u64,
    subject: String,
    project: String,
    status: ChangeStatus,
    #[serde(default)]
    insertions: u64,
    #[serde(default)]
    deletions: u64,
}

fn to_change(raw: GerritChangeInfo) -> Change {
    Change {
        number: raw.number,
        subject: raw.subject,
        project: raw.project,
        status: raw.status,
        insertions: raw.insertions,
        deletions: raw.deletions,
    }
}

/// Result of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status: u16,
    pub changes: Vec<Change>,
}

/// Anything that can answer "which changes mention this key".
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn changes_for_key(
        &self,
        creds: &Credentials,
        jira_key: &str,
    ) -> Result<FetchOutcome, FetchError>;
}

pub fn changes_url(host: &str, jira_key: &str) -> String {
    let host = host.trim_end_matches('/');
    format!("{host}/changes/?q=message:{jira_key}")
}

pub fn basic_auth_header(user: &str, pass: &str) -> String {
    let token = BASE64.encode(format!("{user}:{pass}"));
    format!("Basic {token}")
}

pub fn strip_xssi_prefix(body: &str) -> &str {
    body.get(XSSI_PREFIX_LEN..).unwrap_or("")
}

pub fn parse_changes(body: &str) -> Result<Vec<Change>, FetchError> {
    let raw: Vec<GerritChangeInfo> = serde_json::from_str(strip_xssi_prefix(body))
        .map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(raw.into_iter().map(to_change).collect())
}

#[derive(Debug, Clone)]
pub struct GerritClient {
    client: reqwest::Client,
}

impl GerritClient {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jirrit/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to initialize Gerrit HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChangeSource for GerritClient {
    async fn changes_for_key(
        &self,
        creds: &Credentials,
        jira_key: &str,
    ) -> Result<FetchOutcome, FetchError> {
        if !creds.is_configured() {
            return Err(FetchError::Unconfigured);
        }
        let url = changes_url(&creds.host, jira_key);
        log::info!("GET {url}");

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                basic_auth_header(&creds.user, &creds.pass),
            )
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        log::debug!("GET {url} -> {status}");
        if status != STATUS_OK {
            return Err(FetchError::Http(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let changes = parse_changes(&body)?;
        log::debug!("{jira_key}: {} changes", changes.len());
        Ok(FetchOutcome { status, changes })
    }
}
