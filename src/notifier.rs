use anyhow::Result;
use chrono::Utc;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tempfile::TempPath;

use crate::attachment::{AttachmentStore, TempDirAttachmentStore};
use crate::config::MessagingConfig;
use crate::form::{self, FormPreferences, SubmittedForm};
use crate::model::{AttachmentSource, NotificationEvent, SkipReason, UserIdentity};
use crate::preferences::{PreferenceStore, OVERRIDE_EMAIL_KEY};
use crate::relay::{RelayAccounts, RelayQueue, RelayRecord};
use crate::sanitize::{clean_email, clean_filename};
use crate::transport::{EmailAttachment, EmailTransport, OutgoingEmail};

/// Bitmask describing when a processor is used by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliverySettings(u8);

impl DeliverySettings {
    pub const DEFAULT_LOGGEDIN: Self = Self(0x01);
    pub const DEFAULT_LOGGEDOFF: Self = Self(0x02);
    pub const PERMITTED: Self = Self(0x08);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeliverySettings {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

const EMAIL_DEFAULT_SETTINGS: DeliverySettings = DeliverySettings::PERMITTED
    .union(DeliverySettings::DEFAULT_LOGGEDIN)
    .union(DeliverySettings::DEFAULT_LOGGEDOFF);

/// A message output the host can route notifications through.
pub trait NotificationProcessor {
    fn send(&self, event: &NotificationEvent) -> Result<Delivery>;
    fn render_form(&self, preferences: &FormPreferences) -> Result<String>;
    fn apply_form(&self, form: &SubmittedForm, preferences: &mut HashMap<String, String>);
    fn load_form(&self, preferences: &mut FormPreferences, user_id: i64) -> Result<()>;
    fn default_settings(&self) -> DeliverySettings;
    /// Whether the processor may also mail the internal support user.
    fn can_send_to_any_users(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Recipient was not eligible for mail; counts as success.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    NotConfigured,
    Queued,
    /// An account id is configured but no relay adapters were wired in.
    Unavailable,
    AccountMissing(i64),
    Failed(String),
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::NotConfigured => f.write_str("not configured"),
            RelayOutcome::Queued => f.write_str("queued"),
            RelayOutcome::Unavailable => f.write_str("unavailable"),
            RelayOutcome::AccountMissing(id) => write!(f, "account {} missing", id),
            RelayOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub delivery: Delivery,
    pub attachment_sent: bool,
    pub relay: RelayOutcome,
}

struct Relay {
    accounts: Arc<dyn RelayAccounts>,
    queue: Arc<dyn RelayQueue>,
}

struct ResolvedAttachment {
    path: TempPath,
    name: String,
    mime_type: Option<String>,
}

impl ResolvedAttachment {
    fn cleanup(self) {
        let location = self.path.to_path_buf();
        if let Err(e) = self.path.close() {
            log::warn!("Failed to remove attachment file {}: {}", location.display(), e);
        }
    }
}

pub struct EmailNotifier {
    config: MessagingConfig,
    preferences: Arc<dyn PreferenceStore>,
    transport: Arc<dyn EmailTransport>,
    attachments: Arc<dyn AttachmentStore>,
    relay: Option<Relay>,
}

impl EmailNotifier {
    pub fn new(
        config: MessagingConfig,
        preferences: Arc<dyn PreferenceStore>,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        Self {
            config,
            preferences,
            transport,
            attachments: Arc::new(TempDirAttachmentStore::new()),
            relay: None,
        }
    }

    pub fn with_attachment_store(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_relay(mut self, accounts: Arc<dyn RelayAccounts>, queue: Arc<dyn RelayQueue>) -> Self {
        self.relay = Some(Relay { accounts, queue });
        self
    }

    /// Delivers one event and reports what happened along the way.
    ///
    /// Errors come only from the primary transport. Attachment and relay
    /// problems are logged and reflected in the report instead.
    pub fn send_with_report(&self, event: &NotificationEvent) -> Result<SendReport> {
        if let Some(reason) = event.user_to.ineligibility() {
            log::debug!("Not emailing user {}: {}", event.user_to.id, reason);
            return Ok(SendReport {
                delivery: Delivery::Skipped(reason),
                attachment_sent: false,
                relay: RelayOutcome::NotConfigured,
            });
        }

        let recipient = self.resolve_recipient(&event.user_to);
        let attachment = self.resolve_attachment(event);

        // The reply-to name only travels with a reply-to address.
        let (reply_to, reply_to_name) = match event.reply_to.as_deref() {
            Some(address) => (address, event.reply_to_name.as_deref().unwrap_or("")),
            None => ("", ""),
        };

        let relay = self.dispatch_to_relay(event, &recipient, reply_to);

        let result = {
            let outgoing = OutgoingEmail {
                recipient: &recipient,
                sender: &event.user_from,
                subject: &event.subject,
                body: &event.body,
                html_body: event.html_body.as_deref(),
                attachment: attachment.as_ref().map(|a| EmailAttachment {
                    path: &a.path,
                    name: &a.name,
                    mime_type: a.mime_type.as_deref(),
                }),
                use_true_address: true,
                reply_to,
                reply_to_name,
            };
            self.transport.send(&outgoing)
        };

        let attachment_sent = attachment.is_some();
        if let Some(attachment) = attachment {
            attachment.cleanup();
        }

        result?;
        log::info!("Emailed '{}' to user {} (relay {})", event.subject, recipient.id, relay);

        Ok(SendReport {
            delivery: Delivery::Sent,
            attachment_sent,
            relay,
        })
    }

    /// Writes applied form values back to the store for `user_id`.
    pub fn save_preferences(&self, user_id: i64, preferences: &HashMap<String, String>) -> Result<()> {
        for (key, value) in preferences {
            self.preferences.set(key, user_id, value)?;
        }
        Ok(())
    }

    fn resolve_recipient<'a>(&self, user: &'a UserIdentity) -> Cow<'a, UserIdentity> {
        if !self.config.allow_email_override {
            return Cow::Borrowed(user);
        }

        let stored = match self.preferences.get(OVERRIDE_EMAIL_KEY, user.id) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                log::warn!("Failed to read email override for user {}: {:#}", user.id, e);
                String::new()
            }
        };

        let email = clean_email(&stored);
        if email.is_empty() {
            return Cow::Borrowed(user);
        }

        let mut recipient = user.clone();
        recipient.email = email;
        Cow::Owned(recipient)
    }

    fn resolve_attachment(&self, event: &NotificationEvent) -> Option<ResolvedAttachment> {
        if !self.config.allow_attachments {
            return None;
        }
        let attachment = event.attachment.as_ref()?;

        if attachment.name.is_empty() {
            log::warn!("Attachments should have a file name. No attachments have been sent.");
            return None;
        }

        let file = match &attachment.source {
            AttachmentSource::StoredFile(file) => file,
            AttachmentSource::Unrecognized { kind } => {
                log::warn!(
                    "Attachments should be stored files, got '{}'. No attachments have been sent.",
                    kind
                );
                return None;
            }
        };

        match self.attachments.materialize(file) {
            Ok(path) => Some(ResolvedAttachment {
                path,
                name: clean_filename(&attachment.name),
                mime_type: file.mime_type.clone(),
            }),
            Err(e) => {
                log::warn!("Could not prepare attachment '{}', sending without it: {:#}", attachment.name, e);
                None
            }
        }
    }

    fn dispatch_to_relay(&self, event: &NotificationEvent, recipient: &UserIdentity, reply_to: &str) -> RelayOutcome {
        let Some(account_id) = self.config.relay_account_id else {
            return RelayOutcome::NotConfigured;
        };
        let Some(relay) = &self.relay else {
            log::warn!("Relay account {} configured but no relay queue available", account_id);
            return RelayOutcome::Unavailable;
        };

        let account = match relay.accounts.find(account_id) {
            Ok(Some(account)) => account,
            Ok(None) => {
                log::warn!("Relay account {} not found, skipping relay queue", account_id);
                return RelayOutcome::AccountMissing(account_id);
            }
            Err(e) => {
                log::warn!("Failed to look up relay account {}: {:#}", account_id, e);
                return RelayOutcome::Failed(format!("{:#}", e));
            }
        };

        let record = RelayRecord {
            to: recipient.email.clone(),
            from_address: account.username,
            from_name: event.user_from.first_name.clone(),
            subject: event.subject.clone(),
            body: event.body.clone(),
            html_body: event.html_body.clone().unwrap_or_default(),
            reply_to: reply_to.to_string(),
            queued_at: Utc::now(),
        };

        match relay.queue.enqueue(&record) {
            Ok(()) => {
                log::debug!("Queued relay copy for {} via account {}", record.to, account_id);
                RelayOutcome::Queued
            }
            Err(e) => {
                log::warn!("Relay queue rejected mail for {}: {:#}", record.to, e);
                RelayOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}

impl NotificationProcessor for EmailNotifier {
    fn send(&self, event: &NotificationEvent) -> Result<Delivery> {
        self.send_with_report(event).map(|report| report.delivery)
    }

    fn render_form(&self, preferences: &FormPreferences) -> Result<String> {
        form::render(&self.config, preferences)
    }

    fn apply_form(&self, form: &SubmittedForm, preferences: &mut HashMap<String, String>) {
        form::apply(form, preferences)
    }

    fn load_form(&self, preferences: &mut FormPreferences, user_id: i64) -> Result<()> {
        form::load(self.preferences.as_ref(), preferences, user_id)
    }

    fn default_settings(&self) -> DeliverySettings {
        EMAIL_DEFAULT_SETTINGS
    }

    fn can_send_to_any_users(&self) -> bool {
        true
    }
}
