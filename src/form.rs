//! The per-user preference form: mail format, mail charset and override address.

use anyhow::{Context, Result};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::MessagingConfig;
use crate::model::MailFormat;
use crate::preferences::{PreferenceStore, MAIL_CHARSET_KEY, OVERRIDE_EMAIL_KEY};
use crate::sanitize::is_valid_email;

const FORM_TEMPLATE_NAME: &str = "config_form.html";
const FORM_TEMPLATE: &str = include_str!("../templates/config_form.html");

/// Charset choice meaning "whatever the site uses".
pub const SITE_CHARSET_CHOICE: &str = "0";
const FALLBACK_SITE_CHARSET: &str = "UTF-8";

pub const CHARSETS: &[&str] = &[
    "EUC-JP",
    "ISO-2022-JP",
    "Shift_JIS",
    "EUC-KR",
    "KOI8-R",
    "ISO-8859-1",
    "ISO-8859-2",
    "Windows-1250",
    "Windows-1251",
    "Windows-1252",
    "GB18030",
    "GB2312",
    "Big5",
    "UTF-8",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPreferences {
    pub mail_format: MailFormat,
    pub mail_charset: String,
    pub override_email: String,
    /// Profile address shown as a hint while no override is set.
    pub user_default_email: Option<String>,
}

impl Default for FormPreferences {
    fn default() -> Self {
        Self {
            mail_format: MailFormat::default(),
            mail_charset: SITE_CHARSET_CHOICE.to_string(),
            override_email: String::new(),
            user_default_email: None,
        }
    }
}

/// Fields posted back by the form. Missing fields stay `None`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedForm {
    pub email_csmtp: Option<String>,
    pub preference_mailcharset: Option<String>,
}

#[derive(Serialize)]
struct CharsetField {
    choices: Vec<(String, String)>,
    current: String,
}

#[derive(Serialize)]
struct OverrideField<'a> {
    value: &'a str,
    hint: Option<&'a str>,
    invalid: bool,
}

pub fn render(config: &MessagingConfig, preferences: &FormPreferences) -> Result<String> {
    let formats = vec![
        (MailFormat::Text.form_value(), "Plain text"),
        (MailFormat::Html.form_value(), "HTML"),
    ];

    let charset = config.allow_user_mail_charset.then(|| {
        let site = config
            .site_mail_charset
            .as_deref()
            .filter(|charset| !charset.is_empty())
            .unwrap_or(FALLBACK_SITE_CHARSET);

        let mut choices = vec![(SITE_CHARSET_CHOICE.to_string(), format!("Site ({})", site))];
        choices.extend(CHARSETS.iter().map(|c| (c.to_string(), c.to_string())));

        CharsetField {
            choices,
            current: preferences.mail_charset.clone(),
        }
    });

    let email_override = config.allow_email_override.then(|| {
        let value = preferences.override_email.as_str();
        OverrideField {
            value,
            hint: if value.is_empty() {
                preferences
                    .user_default_email
                    .as_deref()
                    .filter(|email| !email.is_empty())
            } else {
                None
            },
            invalid: !value.is_empty() && !is_valid_email(value),
        }
    });

    let mut env = Environment::new();
    env.add_template(FORM_TEMPLATE_NAME, FORM_TEMPLATE)
        .context("Failed to load preference form template")?;

    env.get_template(FORM_TEMPLATE_NAME)
        .context("Preference form template missing")?
        .render(context! {
            formats => formats,
            current_format => preferences.mail_format.form_value(),
            charset => charset,
            email_override => email_override,
        })
        .context("Failed to render preference form")
}

pub fn apply(form: &SubmittedForm, preferences: &mut HashMap<String, String>) {
    if let Some(email) = &form.email_csmtp {
        preferences.insert(OVERRIDE_EMAIL_KEY.to_string(), email.clone());
    }
    if let Some(charset) = &form.preference_mailcharset {
        preferences.insert(MAIL_CHARSET_KEY.to_string(), charset.clone());
    }
}

pub fn load(store: &dyn PreferenceStore, preferences: &mut FormPreferences, user_id: i64) -> Result<()> {
    preferences.override_email = store
        .get(OVERRIDE_EMAIL_KEY, user_id)
        .with_context(|| format!("Failed to load email override for user {}", user_id))?
        .unwrap_or_default();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferenceStore;

    fn all_enabled() -> MessagingConfig {
        MessagingConfig {
            allow_email_override: true,
            allow_user_mail_charset: true,
            ..MessagingConfig::default()
        }
    }

    #[test]
    fn format_selector_is_always_rendered() {
        let prefs = FormPreferences {
            mail_format: MailFormat::Text,
            ..FormPreferences::default()
        };
        let html = render(&MessagingConfig::default(), &prefs).unwrap();

        assert!(html.contains(r#"name="mailformat""#));
        assert!(html.contains(r#"<option value="0" selected>Plain text</option>"#));
        assert!(html.contains(r#"<option value="1">HTML</option>"#));
        assert!(!html.contains("preference_mailcharset"));
        assert!(!html.contains("email_csmtp"));
    }

    #[test]
    fn charset_selector_defaults_to_site_charset() {
        let mut config = all_enabled();
        config.site_mail_charset = Some("ISO-8859-1".to_string());
        let html = render(&config, &FormPreferences::default()).unwrap();

        assert!(html.contains(r#"name="preference_mailcharset""#));
        assert!(html.contains(r#"<option value="0" selected>Site (ISO-8859-1)</option>"#));
        assert!(html.contains(r#"<option value="KOI8-R">KOI8-R</option>"#));
    }

    #[test]
    fn charset_selector_falls_back_to_utf8() {
        let prefs = FormPreferences {
            mail_charset: "Big5".to_string(),
            ..FormPreferences::default()
        };
        let html = render(&all_enabled(), &prefs).unwrap();

        assert!(html.contains(r#"<option value="0">Site (UTF-8)</option>"#));
        assert!(html.contains(r#"<option value="Big5" selected>Big5</option>"#));
    }

    #[test]
    fn blank_override_shows_default_hint() {
        let prefs = FormPreferences {
            user_default_email: Some("a@x.com".to_string()),
            ..FormPreferences::default()
        };
        let html = render(&all_enabled(), &prefs).unwrap();

        assert!(html.contains(r#"name="email_csmtp" value="""#));
        assert!(html.contains("If left empty, a@x.com will be used"));
        assert!(!html.contains(r#"class="error""#));
    }

    #[test]
    fn stored_override_is_prefilled_without_hint() {
        let prefs = FormPreferences {
            override_email: "b@x.com".to_string(),
            user_default_email: Some("a@x.com".to_string()),
            ..FormPreferences::default()
        };
        let html = render(&all_enabled(), &prefs).unwrap();

        assert!(html.contains(r#"value="b@x.com""#));
        assert!(!html.contains("If left empty"));
        assert!(!html.contains(r#"class="error""#));
    }

    #[test]
    fn invalid_override_is_flagged_and_escaped() {
        let prefs = FormPreferences {
            override_email: r#""><script>"#.to_string(),
            ..FormPreferences::default()
        };
        let html = render(&all_enabled(), &prefs).unwrap();

        assert!(html.contains(r#"<div class="error">Invalid email address</div>"#));
        assert!(html.contains("&quot;&gt;&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn apply_copies_present_fields() {
        let mut preferences = HashMap::new();
        let form = SubmittedForm {
            email_csmtp: Some("b@x.com".to_string()),
            preference_mailcharset: Some("UTF-8".to_string()),
        };

        apply(&form, &mut preferences);
        assert_eq!(preferences.get(OVERRIDE_EMAIL_KEY).map(String::as_str), Some("b@x.com"));
        assert_eq!(preferences.get(MAIL_CHARSET_KEY).map(String::as_str), Some("UTF-8"));
    }

    #[test]
    fn apply_leaves_absent_fields_untouched() {
        let mut preferences = HashMap::from([
            (OVERRIDE_EMAIL_KEY.to_string(), "old@x.com".to_string()),
            (MAIL_CHARSET_KEY.to_string(), "Big5".to_string()),
        ]);
        let form = SubmittedForm {
            email_csmtp: Some(String::new()),
            preference_mailcharset: None,
        };

        apply(&form, &mut preferences);
        assert_eq!(preferences.get(OVERRIDE_EMAIL_KEY).map(String::as_str), Some(""));
        assert_eq!(preferences.get(MAIL_CHARSET_KEY).map(String::as_str), Some("Big5"));
    }

    #[test]
    fn load_defaults_to_empty() {
        let store = MemoryPreferenceStore::new();
        let mut prefs = FormPreferences {
            override_email: "stale@x.com".to_string(),
            ..FormPreferences::default()
        };

        load(&store, &mut prefs, 5).unwrap();
        assert_eq!(prefs.override_email, "");

        store.set(OVERRIDE_EMAIL_KEY, 5, "b@x.com").unwrap();
        load(&store, &mut prefs, 5).unwrap();
        assert_eq!(prefs.override_email, "b@x.com");
    }
}
