#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use csmtp_notifier::config::{Config, ConfigReader, DEFAULT_CONFIG_PATH};
use csmtp_notifier::{
    Attachment, AttachmentSource, ConfiguredRelayAccounts, Delivery, EmailNotifier, HttpRelayQueue,
    MemoryPreferenceStore, NotificationEvent, SmtpEmailTransport, StoredFile, UserIdentity,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

const USAGE: &str = "usage: csmtp-send <event.toml> [config.toml] [preferences.toml]";

#[derive(Deserialize, Debug)]
struct EventFile {
    user_from: UserIdentity,
    user_to: UserIdentity,
    subject: String,
    body: String,
    html_body: Option<String>,
    attachment_path: Option<PathBuf>,
    attachment_name: Option<String>,
    reply_to: Option<String>,
    reply_to_name: Option<String>,
}

fn load_event(path: &Path) -> Result<NotificationEvent> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read event file '{}'", path.display()))?;
    let file: EventFile = toml::from_str(&raw)
        .with_context(|| format!("Syntax error in event file '{}'", path.display()))?;

    let attachment = match &file.attachment_path {
        Some(attachment_path) => {
            let content = fs::read(attachment_path)
                .with_context(|| format!("Cannot read attachment '{}'", attachment_path.display()))?;
            let name = file.attachment_name.clone().unwrap_or_else(|| {
                attachment_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
            Some(Attachment {
                source: AttachmentSource::StoredFile(StoredFile {
                    content,
                    mime_type: None,
                }),
                name,
            })
        }
        None => None,
    };

    Ok(NotificationEvent {
        user_from: file.user_from,
        user_to: file.user_to,
        subject: file.subject,
        body: file.body,
        html_body: file.html_body,
        attachment,
        reply_to: file.reply_to,
        reply_to_name: file.reply_to_name,
    })
}

fn build_notifier(config: &Config, preferences_path: Option<&Path>) -> Result<EmailNotifier> {
    let smtp = config
        .smtp
        .as_ref()
        .context("Missing [smtp] section in config")?;
    let transport = SmtpEmailTransport::new(smtp)?;

    let preferences = match preferences_path {
        Some(path) => MemoryPreferenceStore::from_toml_file(path)?,
        None => MemoryPreferenceStore::new(),
    };

    let mut notifier = EmailNotifier::new(config.messaging.clone(), Arc::new(preferences), Arc::new(transport));

    if let Some(relay) = &config.relay {
        let queue = HttpRelayQueue::new(relay)?;
        let accounts = ConfiguredRelayAccounts::new(config.relay_accounts.clone());
        notifier = notifier.with_relay(Arc::new(accounts), Arc::new(queue));
        info!("Relay queue enabled at {}", relay.url);
    } else if config.messaging.relay_account_id.is_some() {
        warn!("relay_account_id is set but no [relay] section is configured");
    }

    Ok(notifier)
}

fn run(config: &Config, event_path: &Path, preferences_path: Option<&Path>) -> Result<()> {
    let notifier = build_notifier(config, preferences_path)?;
    let event = load_event(event_path)?;

    let report = notifier.send_with_report(&event)?;
    match report.delivery {
        Delivery::Sent => info!(
            "Delivered '{}' (attachment: {}, relay: {})",
            event.subject, report.attachment_sent, report.relay
        ),
        Delivery::Skipped(reason) => info!("Recipient skipped: {}", reason),
    }

    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(event_path) = args.first().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);
    let preferences_path = args.get(2).map(PathBuf::from);

    let config = match ConfigReader::from_path(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(2);
        }
    };

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.general.log_level))
        .init();

    debug!("Loaded config from {}", config_path);

    if let Err(e) = run(&config, &event_path, preferences_path.as_deref()) {
        // Pretty debug formatting keeps the context chain in the log
        error!("Failed to send notification: {:#}", e);
        process::exit(1);
    }
}
