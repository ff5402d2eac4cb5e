//! Users and notification events as handed over by the host.

use serde::Deserialize;
use std::fmt;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Manual,
    /// Account exists but may not log in; never receives mail.
    NoLogin,
    #[serde(other)]
    External,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailFormat {
    Text,
    #[default]
    Html,
}

impl MailFormat {
    /// Value used for this format in the preference form.
    pub fn form_value(self) -> &'static str {
        match self {
            MailFormat::Text => "0",
            MailFormat::Html => "1",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    #[serde(default)]
    pub auth: AuthMethod,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub deleted: bool,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub mail_format: MailFormat,
}

impl UserIdentity {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Why this user must not be mailed, if anything.
    pub fn ineligibility(&self) -> Option<SkipReason> {
        if self.auth == AuthMethod::NoLogin {
            Some(SkipReason::NoLogin)
        } else if self.suspended {
            Some(SkipReason::Suspended)
        } else if self.deleted {
            Some(SkipReason::Deleted)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoLogin,
    Suspended,
    Deleted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoLogin => "login disabled",
            SkipReason::Suspended => "user suspended",
            SkipReason::Deleted => "user deleted",
        };
        f.write_str(reason)
    }
}

/// File content kept by the host's file storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    StoredFile(StoredFile),
    /// Anything else the host passed along; cannot be mailed.
    Unrecognized { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub source: AttachmentSource,
    /// Declared filename, as supplied by the sender.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub user_from: UserIdentity,
    pub user_to: UserIdentity,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<String>,
    pub reply_to_name: Option<String>,
}
