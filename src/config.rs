use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Settings key for the service-enabled toggle.
pub const ENABLED_KEY: &str = "poulda.enabled";

/// Settings key for the whitespace-separated `user:pass` account list.
pub const ACCOUNTS_KEY: &str = "poulda.accounts";

/// Settings key for the directory uploads are spooled to.
pub const SPOOL_DIR_KEY: &str = "poulda.spool_dir";

/// Centralized service configuration.
///
/// A flat string-to-string mapping, read-only for the lifetime of a
/// request. The hosting application builds it once at startup (from the
/// environment, a config file, or its own mechanism) and attaches it to
/// every [`Request`](crate::Request).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    entries: HashMap<String, String>,
}

impl Settings {
    /// An empty settings map. Everything is absent, so the service is
    /// disabled and no account authenticates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a settings map from `(key, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read settings from the process environment.
    ///
    /// `POULDA_ENABLED`, `POULDA_ACCOUNTS` and `POULDA_SPOOL_DIR` map to
    /// their `poulda.*` keys. Unset variables stay absent, which leaves
    /// the service disabled and the account list empty.
    pub fn from_env() -> Self {
        let mut settings = Self::new();
        for (var, key) in [
            ("POULDA_ENABLED", ENABLED_KEY),
            ("POULDA_ACCOUNTS", ACCOUNTS_KEY),
            ("POULDA_SPOOL_DIR", SPOOL_DIR_KEY),
        ] {
            if let Ok(value) = env::var(var) {
                settings.set(key, value);
            }
        }
        settings
    }

    /// Look up a setting by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert or replace a setting.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Whether the service accepts requests at all.
    ///
    /// True only when `poulda.enabled` is exactly the string `"true"`.
    /// An absent or malformed value means disabled.
    pub fn service_enabled(&self) -> bool {
        self.get(ENABLED_KEY) == Some("true")
    }
}
