//! Side-channel delivery through a third-party SMTP relay queue.
//!
//! The relay only duplicates a delivery. Whatever happens here is reported
//! back to the caller for logging, but never decides whether a send succeeded.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::RelayConfig;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RelayAccount {
    pub id: i64,
    pub username: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RelayRecord {
    pub to: String,
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
    pub body: String,
    pub html_body: String,
    pub reply_to: String,
    pub queued_at: DateTime<Utc>,
}

pub trait RelayAccounts: Send + Sync {
    fn find(&self, id: i64) -> Result<Option<RelayAccount>>;
}

pub trait RelayQueue: Send + Sync {
    fn enqueue(&self, record: &RelayRecord) -> Result<()>;
}

/// Relay accounts listed in the `[[relay_account]]` config tables.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredRelayAccounts {
    accounts: Vec<RelayAccount>,
}

impl ConfiguredRelayAccounts {
    pub fn new(accounts: Vec<RelayAccount>) -> Self {
        Self { accounts }
    }
}

impl RelayAccounts for ConfiguredRelayAccounts {
    fn find(&self, id: i64) -> Result<Option<RelayAccount>> {
        Ok(self.accounts.iter().find(|account| account.id == id).cloned())
    }
}

pub struct HttpRelayQueue {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
}

impl HttpRelayQueue {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: queue_endpoint(&config.url)?,
            api_token: config.api_token.clone(),
        })
    }
}

// The queue lives under the configured base URL, which may itself carry a
// path prefix, e.g. https://relay.example.com/api => https://relay.example.com/api/queue
fn queue_endpoint(base_url: &str) -> Result<Url> {
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }

    let parsed = Url::parse(&base).context("Invalid relay base URL")?;
    parsed.join("queue").context("Failed to append queue to relay URL")
}

impl RelayQueue for HttpRelayQueue {
    fn enqueue(&self, record: &RelayRecord) -> Result<()> {
        log::debug!("Posting relay mail for {} to {}", record.to, self.endpoint);

        let mut request = self.client.post(self.endpoint.clone()).json(record);

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .with_context(|| format!("Failed to enqueue relay mail for {}", record.to))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Relay queue returned error status {} for {}",
                response.status(),
                record.to
            );
        }

        Ok(())
    }
}
