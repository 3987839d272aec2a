//! Incremental request builder.

use crate::error::{Error, Result};
use crate::model::{HttpMethod, RequestOptions};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

/// Accumulates one outbound request step by step.
///
/// Values arrive already resolved against the dataset; the builder
/// only stores them.
#[derive(Debug, Clone, Default)]
pub struct Request {
    gateway: String,
    path: String,
    method: HttpMethod,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    payload: Option<Value>,
    insecure: bool,
}

impl Request {
    pub fn new(gateway: impl Into<String>, insecure: bool) -> Self {
        Self {
            gateway: gateway.into(),
            insecure,
            ..Self::default()
        }
    }

    pub fn set_host(&mut self, gateway: impl Into<String>) {
        self.gateway = gateway.into();
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Parse and store the method. The current method is kept when
    /// the verb is unsupported.
    pub fn set_method(&mut self, method: &str) -> Result<()> {
        self.method = method.parse()?;
        Ok(())
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Set method and path together. Nothing changes when the method is
    /// rejected.
    pub fn method_path(&mut self, method: &str, path: impl Into<String>) -> Result<()> {
        self.set_method(method)?;
        self.path = path.into();
        Ok(())
    }

    /// Set a header, replacing any earlier header whose name matches
    /// case-insensitively.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.headers, name, value.into(), true);
    }

    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.set_header(name.as_ref(), value);
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_query_string(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.query, name, value.into(), false);
    }

    pub fn set_query_strings<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in params {
            self.set_query_string(name.as_ref(), value);
        }
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Insert `value` at the dot-path `path`, creating intermediate
    /// objects. A non-object intermediate is replaced by an object.
    pub fn add_payload(&mut self, path: &str, value: Value) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPayloadPath(path.to_string()));
        }

        let root = self
            .payload
            .get_or_insert_with(|| Value::Object(Map::new()));
        let mut current = root;
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(Error::InvalidPayloadPath(path.to_string())),
        };
        for segment in parents {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert(last.to_string(), value);
        debug!(path, "payload property set");
        Ok(())
    }

    pub fn add_payload_null(&mut self, path: &str) -> Result<()> {
        self.add_payload(path, Value::Null)
    }

    pub fn add_payload_bool(&mut self, path: &str, flag: bool) -> Result<()> {
        self.add_payload(path, Value::Bool(flag))
    }

    pub fn add_payload_empty_array(&mut self, path: &str) -> Result<()> {
        self.add_payload(path, Value::Array(Vec::new()))
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Finalize into a transport-ready description.
    pub fn get_options(&self) -> Result<RequestOptions> {
        let url = self.compose_url()?;
        Ok(RequestOptions {
            method: self.method,
            url,
            headers: self.headers.clone(),
            query: self.query.clone(),
            body: self.payload.clone(),
            insecure: self.insecure,
        })
    }

    fn compose_url(&self) -> Result<String> {
        let raw = if is_absolute_url(&self.path) {
            self.path.clone()
        } else {
            let base = self.gateway.trim_end_matches('/');
            if self.path.starts_with('/') {
                format!("{base}{}", self.path)
            } else {
                format!("{base}/{}", self.path)
            }
        };
        let url = Url::parse(&raw).map_err(|e| Error::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        Ok(url.to_string())
    }
}

/// A path starting with its own scheme (`https://...`); URLs inside the
/// query string do not count.
fn is_absolute_url(path: &str) -> bool {
    let head = path.split(['/', '?', '#']).next().unwrap_or_default();
    head.len() > 1 && head.ends_with(':') && Url::parse(path).is_ok()
}

fn upsert(
    entries: &mut Vec<(String, String)>,
    name: &str,
    value: String,
    ignore_case: bool,
) {
    let existing = entries.iter_mut().find(|(k, _)| {
        if ignore_case {
            k.eq_ignore_ascii_case(name)
        } else {
            k == name
        }
    });
    match existing {
        Some(entry) => entry.1 = value,
        None => entries.push((name.to_string(), value)),
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}
