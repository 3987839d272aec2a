//! The dataset: a per-scenario key/value store used to resolve
//! `{{ name }}` placeholders in step arguments.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(.+?)\s*\}\}")
        .expect("failed to compile placeholder regex")
});

/// Scenario-scoped key/value store.
///
/// Secrets are seeded once from the environment configuration and can
/// not be overwritten by [`DataStore::set`]. Runtime values captured
/// from responses are stored alongside them.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    entries: HashMap<String, Value>,
    secrets: HashSet<String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret entry. Only called while initialising a scenario.
    pub(crate) fn insert_secret(&mut self, key: &str, value: Value) {
        debug!(key, "seeding secret into dataset");
        self.entries.insert(key.to_string(), value);
        self.secrets.insert(key.to_string());
    }

    /// Store or overwrite a runtime entry.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if self.secrets.contains(key) {
            return Err(Error::ProtectedKey(key.to_string()));
        }
        debug!(key, "storing value in dataset");
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Raw lookup without placeholder handling.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_secret(&self, key: &str) -> bool {
        self.secrets.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a step argument.
    ///
    /// Non-string values are returned unchanged. A string made of a
    /// single marker (`"{{ id }}"`) yields the stored value with its
    /// JSON type intact; any other string has each marker replaced by
    /// the textual form of its entry. Substituted text is not scanned
    /// again.
    pub fn get(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) => {
                if let Some(key) = sole_placeholder(text) {
                    return self.entry(key).cloned();
                }
                self.resolve(text).map(Value::String)
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve every marker in `text` into its textual form.
    pub fn resolve(&self, text: &str) -> Result<String> {
        let mut resolved = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(text) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            resolved.push_str(&text[last..whole.start()]);
            resolved.push_str(&value_to_text(self.entry(key.as_str())?));
            last = whole.end();
        }
        resolved.push_str(&text[last..]);
        Ok(resolved)
    }

    fn entry(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::UnresolvedPlaceholder(key.to_string()))
    }
}

/// Text used when a value is interpolated into a string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sole_placeholder(text: &str) -> Option<&str> {
    let caps = PLACEHOLDER_RE.captures(text.trim())?;
    let whole = caps.get(0)?;
    if whole.as_str().len() != text.trim().len() {
        return None;
    }
    caps.get(1).map(|key| key.as_str())
}
