use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

/// Per-user address that replaces the profile email for this processor.
pub const OVERRIDE_EMAIL_KEY: &str = "message_processor_email_csmtp";
pub const MAIL_CHARSET_KEY: &str = "mailcharset";

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str, user_id: i64) -> Result<Option<String>>;
    fn set(&self, key: &str, user_id: i64, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<(i64, String), String>>,
}

#[derive(Deserialize, Debug, Default)]
struct PreferenceFile {
    #[serde(default)]
    users: HashMap<String, HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a store from a TOML file with one `[users.<id>]` table per user.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Cannot read preferences file '{}'", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid preferences file '{}'", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: PreferenceFile = toml::from_str(raw).context("Failed to parse preferences")?;
        let mut values = HashMap::new();

        for (user, prefs) in file.users {
            let user_id: i64 = user
                .parse()
                .with_context(|| format!("Invalid user id '{}'", user))?;
            for (key, value) in prefs {
                values.insert((user_id, key), value);
            }
        }

        Ok(Self {
            values: RwLock::new(values),
        })
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str, user_id: i64) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow!("Preference store lock poisoned"))?;
        Ok(values.get(&(user_id, key.to_string())).cloned())
    }

    fn set(&self, key: &str, user_id: i64, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("Preference store lock poisoned"))?;
        values.insert((user_id, key.to_string()), value.to_string());
        Ok(())
    }
}
