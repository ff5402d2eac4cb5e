use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::relay::RelayAccount;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: ConfigGeneral,
    #[serde(default)]
    pub messaging: MessagingConfig,
    pub smtp: Option<SmtpConfig>,
    pub relay: Option<RelayConfig>,
    #[serde(default, rename = "relay_account")]
    pub relay_accounts: Vec<RelayAccount>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConfigGeneral {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ConfigGeneral {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Site-wide switches consulted on every send and form render.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MessagingConfig {
    pub allow_attachments: bool,
    pub allow_email_override: bool,
    pub allow_user_mail_charset: bool,
    pub site_mail_charset: Option<String>,
    /// When set, every delivery is also pushed to the relay queue under this account.
    pub relay_account_id: Option<i64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub noreply_address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_smtp_tls() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
    pub api_token: Option<String>,
}

fn default_relay_timeout() -> u64 {
    10
}

pub struct ConfigReader;

impl ConfigReader {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let conf = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        Self::parse(&conf).with_context(|| format!("Syntax error in config file '{}'", path.display()))
    }

    pub fn parse(conf: &str) -> Result<Config> {
        toml::from_str(conf).context("Failed to parse config")
    }
}
