#![forbid(unsafe_code)]

use super::LixError;
use super::support::DETERMINISTIC_MODE_KEY;
use lix_core::model::Account;
use lix_core::plugin::ChangeDetectionPlugin;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// How to open a [`super::Lix`]. `Default` opens a fresh, empty instance.
#[derive(Clone, Default)]
pub struct LixOptions {
    /// Database image produced by [`super::Lix::to_blob`].
    pub blob: Option<Vec<u8>>,
    /// Written into `key_value` on open, overriding stored values.
    pub key_values: Vec<(String, Value)>,
    /// Upserted and made the only active account.
    pub account: Option<Account>,
    pub plugins: Vec<Arc<dyn ChangeDetectionPlugin>>,
}

impl std::fmt::Debug for LixOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LixOptions")
            .field("blob_bytes", &self.blob.as_ref().map(Vec::len))
            .field("key_values", &self.key_values)
            .field("account", &self.account)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsDocument {
    #[serde(default)]
    key_values: serde_json::Map<String, Value>,
    #[serde(default)]
    account: Option<Account>,
    #[serde(default)]
    deterministic: bool,
}

impl LixOptions {
    /// Ids become `test_0000000001`, `test_0000000002`, ... and timestamps a logical clock.
    pub fn deterministic() -> Self {
        Self::default().with_key_value(DETERMINISTIC_MODE_KEY, Value::Bool(true))
    }

    /// Parses `{"key_values": {...}, "account": {"id", "name"}, "deterministic": bool}`.
    pub fn from_json(raw: &str) -> Result<Self, LixError> {
        let document: OptionsDocument = serde_json::from_str(raw)?;
        let mut options = if document.deterministic {
            Self::deterministic()
        } else {
            Self::default()
        };
        options
            .key_values
            .extend(document.key_values.into_iter());
        options.account = document.account;
        Ok(options)
    }

    pub fn with_blob(mut self, blob: Vec<u8>) -> Self {
        self.blob = Some(blob);
        self
    }

    pub fn with_key_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.key_values.push((key.into(), value));
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn ChangeDetectionPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_reads_known_fields() {
        let options = LixOptions::from_json(
            r#"{"deterministic":true,"key_values":{"theme":"dark"},"account":{"id":"a1","name":"Ada"}}"#,
        )
        .unwrap();
        assert!(
            options
                .key_values
                .iter()
                .any(|(key, value)| key == DETERMINISTIC_MODE_KEY && value == &Value::Bool(true))
        );
        assert!(
            options
                .key_values
                .iter()
                .any(|(key, value)| key == "theme" && value == "dark")
        );
        assert_eq!(options.account.unwrap().name, "Ada");
    }

    #[test]
    fn from_json_rejects_unknown_fields() {
        assert!(LixOptions::from_json(r#"{"blob":"x"}"#).is_err());
    }
}
