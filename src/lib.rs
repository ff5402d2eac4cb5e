//! Email message output for a host messaging framework.
//!
//! [`EmailNotifier`] delivers one notification per call through an
//! [`EmailTransport`], honouring per-user address overrides and optionally
//! copying the mail to a third-party relay queue. It also renders and parses
//! the small preference form users see for this output.
//!
//! Everything the notifier talks to is a trait so the host can plug in its
//! own storage and transport. SMTP, in-memory, temp-dir and HTTP adapters are
//! bundled for standalone use.

pub mod attachment;
pub mod config;
pub mod form;
pub mod model;
pub mod notifier;
pub mod preferences;
pub mod relay;
pub mod sanitize;
pub mod transport;

pub use attachment::{AttachmentStore, TempDirAttachmentStore};
pub use config::{Config, ConfigReader, MessagingConfig};
pub use form::{FormPreferences, SubmittedForm};
pub use model::{Attachment, AttachmentSource, AuthMethod, MailFormat, NotificationEvent, SkipReason, StoredFile, UserIdentity};
pub use notifier::{Delivery, DeliverySettings, EmailNotifier, NotificationProcessor, RelayOutcome, SendReport};
pub use preferences::{MemoryPreferenceStore, PreferenceStore};
pub use relay::{ConfiguredRelayAccounts, HttpRelayQueue, RelayAccount, RelayAccounts, RelayQueue, RelayRecord};
pub use transport::{EmailTransport, OutgoingEmail, SmtpEmailTransport};
