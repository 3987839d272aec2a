//! Read-only view over a completed call.

use crate::error::{Error, Result};
use crate::model::{RequestOptions, TransportResult};
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{LazyLock, OnceLock};

static JSON_CONTENT_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)application/(?:[\w.+-]*\+)?json")
        .expect("failed to compile content-type regex")
});

/// Address of a value inside a response body.
///
/// A leading `$` selects a JSON-path query evaluated against the raw
/// body; anything else is a dot-path into the flattened body.
#[derive(Debug, Clone)]
pub enum PathExpr {
    DotPath(String),
    JsonPathQuery { expr: String, query: JsonPath },
}

impl PathExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        if expr.starts_with('$') {
            let query =
                JsonPath::parse(expr).map_err(|e| Error::InvalidJsonPath {
                    path: expr.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(PathExpr::JsonPathQuery {
                expr: expr.to_string(),
                query,
            })
        } else {
            Ok(PathExpr::DotPath(expr.to_string()))
        }
    }

    /// The whole body.
    pub fn root() -> Self {
        // "$" is always a valid query.
        PathExpr::parse("$").unwrap_or_else(|_| PathExpr::DotPath(String::new()))
    }
}

impl FromStr for PathExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PathExpr::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathExpr::DotPath(expr) | PathExpr::JsonPathQuery { expr, .. } => {
                f.write_str(expr)
            }
        }
    }
}

/// Response of one call with dual-mode body addressing.
#[derive(Debug)]
pub struct ResponseView {
    result: TransportResult,
    is_json: bool,
    flattened: OnceLock<BTreeMap<String, Value>>,
}

impl ResponseView {
    pub fn new(result: TransportResult) -> Self {
        let is_json = header_value(&result.headers, "content-type")
            .is_some_and(|ct| JSON_CONTENT_TYPE_RE.is_match(ct));
        Self {
            result,
            is_json,
            flattened: OnceLock::new(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.result.status_code
    }

    pub fn timing_ms(&self) -> u64 {
        self.result.timing_ms
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.result.headers
    }

    pub fn body(&self) -> &Value {
        &self.result.body
    }

    pub fn request(&self) -> &RequestOptions {
        &self.result.request
    }

    pub fn is_json(&self) -> bool {
        self.is_json
    }

    /// Dot-path projection of a JSON body; empty for any other body.
    pub fn flattened_body(&self) -> &BTreeMap<String, Value> {
        self.flattened.get_or_init(|| {
            let mut flat = BTreeMap::new();
            if self.is_json {
                flatten_value("", &self.result.body, &mut flat);
            }
            flat
        })
    }

    /// Resolve a body property, first match only for JSON-path queries.
    pub fn find_in_body(&self, expr: &PathExpr) -> Option<&Value> {
        match expr {
            PathExpr::JsonPathQuery { query, .. } => {
                query.query(&self.result.body).first()
            }
            PathExpr::DotPath(path) => self.flattened_body().get(path),
        }
    }

    /// Case-insensitive header lookup.
    pub fn find_in_header(&self, name: &str) -> Option<&str> {
        header_value(&self.result.headers, name)
    }

    pub fn get_result(&self) -> &TransportResult {
        &self.result
    }
}

fn header_value<'a>(
    headers: &'a HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

/// Record every node of `value` under its dot-path, containers
/// included. Array elements use their index as the segment.
fn flatten_value(
    prefix: &str,
    value: &Value,
    flat: &mut BTreeMap<String, Value>,
) {
    if !prefix.is_empty() {
        flat.insert(prefix.to_string(), value.clone());
    }
    let join = |segment: &str| {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{prefix}.{segment}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                flatten_value(&join(key), val, flat);
            }
        }
        Value::Array(array) => {
            for (idx, val) in array.iter().enumerate() {
                flatten_value(&join(&idx.to_string()), val, flat);
            }
        }
        _ => {}
    }
}
