use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use std::fs;
use std::path::Path;

use crate::config::SmtpConfig;
use crate::model::{MailFormat, UserIdentity};

const OCTET_STREAM: &str = "application/octet-stream";

/// Port where SMTP is wrapped in TLS from the first byte; everything else upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Everything the mail transport needs for one delivery.
#[derive(Debug, Clone)]
pub struct OutgoingEmail<'a> {
    pub recipient: &'a UserIdentity,
    pub sender: &'a UserIdentity,
    pub subject: &'a str,
    pub body: &'a str,
    pub html_body: Option<&'a str>,
    pub attachment: Option<EmailAttachment<'a>>,
    /// Send from the sender's own address instead of the site no-reply address.
    pub use_true_address: bool,
    pub reply_to: &'a str,
    pub reply_to_name: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct EmailAttachment<'a> {
    pub path: &'a Path,
    pub name: &'a str,
    pub mime_type: Option<&'a str>,
}

pub trait EmailTransport: Send + Sync {
    fn send(&self, email: &OutgoingEmail<'_>) -> Result<()>;
}

pub struct SmtpEmailTransport {
    mailer: SmtpTransport,
    noreply: Address,
}

impl SmtpEmailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut mailer_builder = if config.smtp_tls && config.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(&config.smtp_host).context("Failed to create SMTP transport")?
        } else if config.smtp_tls {
            SmtpTransport::starttls_relay(&config.smtp_host).context("Failed to create SMTP transport")?
        } else {
            SmtpTransport::builder_dangerous(&config.smtp_host)
        };
        mailer_builder = mailer_builder.port(config.smtp_port);

        // Add credentials if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mailer_builder = mailer_builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        let noreply = config
            .noreply_address
            .parse()
            .context("Invalid 'noreply_address' email address")?;

        Ok(Self {
            mailer: mailer_builder.build(),
            noreply,
        })
    }

    fn build_message(&self, email: &OutgoingEmail<'_>) -> Result<Message> {
        let sender_address = if email.use_true_address {
            email.sender.email.parse().unwrap_or_else(|_| {
                log::debug!(
                    "Sender {} has no usable address, falling back to no-reply",
                    email.sender.id
                );
                self.noreply.clone()
            })
        } else {
            self.noreply.clone()
        };

        let to_address: Address = email
            .recipient
            .email
            .parse()
            .context("Invalid recipient email address")?;

        let mut message_builder = Message::builder()
            .from(Mailbox::new(display_name(&email.sender.full_name()), sender_address))
            .to(Mailbox::new(display_name(&email.recipient.full_name()), to_address))
            .subject(email.subject);

        if !email.reply_to.is_empty() {
            match email.reply_to.parse::<Address>() {
                Ok(reply_to) => {
                    message_builder =
                        message_builder.reply_to(Mailbox::new(display_name(email.reply_to_name), reply_to));
                }
                Err(e) => log::warn!(
                    "Ignoring invalid reply-to address '{}': {}",
                    email.reply_to,
                    e
                ),
            }
        }

        let html = email
            .html_body
            .filter(|html| !html.is_empty() && email.recipient.mail_format == MailFormat::Html);

        let message = match (&email.attachment, html) {
            (None, None) => message_builder.singlepart(SinglePart::plain(email.body.to_string())),
            (None, Some(html)) => message_builder.multipart(MultiPart::alternative_plain_html(
                email.body.to_string(),
                html.to_string(),
            )),
            (Some(attachment), html) => {
                let body_part = match html {
                    Some(html) => MultiPart::alternative_plain_html(email.body.to_string(), html.to_string()),
                    None => MultiPart::alternative().singlepart(SinglePart::plain(email.body.to_string())),
                };
                message_builder.multipart(
                    MultiPart::mixed()
                        .multipart(body_part)
                        .singlepart(attachment_part(attachment)?),
                )
            }
        };

        message.context("Failed to build email message")
    }
}

fn display_name(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn attachment_part(attachment: &EmailAttachment<'_>) -> Result<SinglePart> {
    let content = fs::read(attachment.path)
        .with_context(|| format!("Failed to read attachment file: {}", attachment.path.display()))?;
    let content_type = ContentType::parse(attachment.mime_type.unwrap_or(OCTET_STREAM))
        .or_else(|_| ContentType::parse(OCTET_STREAM))
        .context("Invalid attachment content type")?;

    Ok(Attachment::new(attachment.name.to_string()).body(content, content_type))
}

impl EmailTransport for SmtpEmailTransport {
    fn send(&self, email: &OutgoingEmail<'_>) -> Result<()> {
        log::info!("Sending email '{}' to {}", email.subject, email.recipient.email);

        let message = self.build_message(email)?;
        self.mailer
            .send(&message)
            .context("Failed to send email")?;

        log::info!("Email sent successfully");
        Ok(())
    }
}
