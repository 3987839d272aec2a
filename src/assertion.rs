//! Assertions over a [`ResponseView`] and dataset capture.
//!
//! Every check returns `Ok(())` on success and an
//! [`AssertionFailure`](crate::error::AssertionFailure) carrying the
//! expected and actual values otherwise.

use crate::data::{value_to_text, DataStore};
use crate::error::{AssertionFailure, Error, Result};
use crate::response::{PathExpr, ResponseView};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{debug, warn};

/// Allowed distance from now for "close to now" checks.
pub const CLOSE_TO_NOW_TOLERANCE_SECS: i64 = 60;

const ABSENT: &str = "<absent>";

fn fail<T>(
    message: impl Into<String>,
    expected: impl std::fmt::Display,
    actual: impl std::fmt::Display,
) -> Result<T> {
    Err(AssertionFailure::new(message, expected, actual).into())
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| ABSENT.to_string(), Value::to_string)
}

pub fn status(view: &ResponseView, expected: u16) -> Result<()> {
    if view.status_code() != expected {
        return fail("unexpected response status", expected, view.status_code());
    }
    Ok(())
}

/// Passes when the call took strictly less than `max_ms`.
pub fn response_time_under(view: &ResponseView, max_ms: u64) -> Result<()> {
    if view.timing_ms() >= max_ms {
        return fail(
            "response time is too high",
            format!("< {max_ms} ms"),
            format!("{} ms", view.timing_ms()),
        );
    }
    Ok(())
}

pub fn header_equals(view: &ResponseView, name: &str, expected: &str) -> Result<()> {
    match view.find_in_header(name) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => fail(
            format!("response header \"{name}\" does not match"),
            expected,
            actual,
        ),
        None => fail(
            format!("response header \"{name}\" is missing"),
            expected,
            ABSENT,
        ),
    }
}

/// Table form of [`header_equals`]; expected values go through the
/// dataset first.
pub fn headers_contain(
    view: &ResponseView,
    expected: &[(String, String)],
    data: &DataStore,
) -> Result<()> {
    for (name, value) in expected {
        header_equals(view, name, &data.resolve(value)?)?;
    }
    Ok(())
}

pub fn header_exists(view: &ResponseView, name: &str) -> Result<()> {
    if view.find_in_header(name).is_none() {
        return fail(
            format!("response header \"{name}\" is missing"),
            "present",
            ABSENT,
        );
    }
    Ok(())
}

pub fn header_absent(view: &ResponseView, name: &str) -> Result<()> {
    if let Some(actual) = view.find_in_header(name) {
        return fail(
            format!("response header \"{name}\" should not be present"),
            ABSENT,
            actual,
        );
    }
    Ok(())
}

/// Compare the textual rendering of a scalar with `expected`.
pub fn body_equals(view: &ResponseView, path: &PathExpr, expected: &str) -> Result<()> {
    let actual = view.find_in_body(path);
    match actual {
        Some(value) if !value.is_object() && !value.is_array() && !value.is_null() => {
            if value_to_text(value) == expected {
                return Ok(());
            }
        }
        _ => {}
    }
    fail(
        format!("response body at \"{path}\" does not match"),
        format!("{expected:?}"),
        describe(actual),
    )
}

/// Numeric comparison; numeric strings are accepted.
pub fn body_equals_int(view: &ResponseView, path: &PathExpr, expected: i64) -> Result<()> {
    let actual = view.find_in_body(path);
    let matches = match actual {
        Some(Value::Number(n)) => number_equals(n, expected),
        Some(Value::String(s)) => s
            .trim()
            .parse::<serde_json::Number>()
            .is_ok_and(|n| number_equals(&n, expected)),
        _ => false,
    };
    if matches {
        return Ok(());
    }
    fail(
        format!("response body at \"{path}\" does not match"),
        expected,
        describe(actual),
    )
}

/// Integers compare exactly; only fractional numbers go through `f64`.
fn number_equals(number: &serde_json::Number, expected: i64) -> bool {
    if let Some(n) = number.as_i64() {
        return n == expected;
    }
    if number.is_u64() {
        return false;
    }
    number.as_f64() == Some(expected as f64)
}

fn body_identity(view: &ResponseView, path: &PathExpr, expected: &Value) -> Result<()> {
    let actual = view.find_in_body(path);
    if actual == Some(expected) {
        return Ok(());
    }
    fail(
        format!("response body at \"{path}\" does not match"),
        expected,
        describe(actual),
    )
}

pub fn body_true(view: &ResponseView, path: &PathExpr) -> Result<()> {
    body_identity(view, path, &Value::Bool(true))
}

pub fn body_false(view: &ResponseView, path: &PathExpr) -> Result<()> {
    body_identity(view, path, &Value::Bool(false))
}

pub fn body_null(view: &ResponseView, path: &PathExpr) -> Result<()> {
    body_identity(view, path, &Value::Null)
}

pub fn body_empty(view: &ResponseView, path: &PathExpr) -> Result<()> {
    body_identity(view, path, &Value::String(String::new()))
}

pub fn body_not_null(view: &ResponseView, path: &PathExpr) -> Result<()> {
    match view.find_in_body(path) {
        None | Some(Value::Null) => fail(
            format!("response body at \"{path}\" should not be null"),
            "not null",
            describe(view.find_in_body(path)),
        ),
        Some(_) => Ok(()),
    }
}

fn expect_array<'a>(view: &'a ResponseView, path: &PathExpr) -> Result<&'a Vec<Value>> {
    match view.find_in_body(path) {
        Some(Value::Array(items)) => Ok(items),
        other => fail(
            format!("response body at \"{path}\" is not an array"),
            "array",
            describe(other),
        ),
    }
}

pub fn is_array(view: &ResponseView, path: &PathExpr) -> Result<()> {
    expect_array(view, path).map(|_| ())
}

pub fn array_of_len(view: &ResponseView, path: &PathExpr, expected: usize) -> Result<()> {
    let items = expect_array(view, path)?;
    if items.len() != expected {
        return fail(
            format!("array at \"{path}\" has an unexpected number of items"),
            expected,
            items.len(),
        );
    }
    Ok(())
}

pub fn non_empty_array(view: &ResponseView, path: &PathExpr) -> Result<()> {
    if expect_array(view, path)?.is_empty() {
        return fail(
            format!("array at \"{path}\" should not be empty"),
            "at least 1 item",
            0,
        );
    }
    Ok(())
}

pub fn empty_array(view: &ResponseView, path: &PathExpr) -> Result<()> {
    array_of_len(view, path, 0)
}

/// Passes for a `null`, empty string, empty object or empty array body.
pub fn response_is_empty(view: &ResponseView) -> Result<()> {
    let empty = match view.body() {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if !empty {
        return fail("response body should be empty", "empty", view.body());
    }
    Ok(())
}

/// Compile a `/pattern/flags` literal, or a bare pattern.
pub fn parse_regex(literal: &str) -> Result<Regex> {
    let invalid = |reason: String| Error::InvalidRegex {
        pattern: literal.to_string(),
        reason,
    };
    let (pattern, flags) = match literal.strip_prefix('/').and_then(|rest| rest.rsplit_once('/')) {
        Some((pattern, flags)) => (pattern, flags),
        None => (literal, ""),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'g' | 'u' => {}
            other => return Err(invalid(format!("unsupported flag '{other}'"))),
        }
    }
    builder.build().map_err(|e| invalid(e.to_string()))
}

pub fn body_matches(view: &ResponseView, path: &PathExpr, literal: &str) -> Result<()> {
    let regex = parse_regex(literal)?;
    let actual = view.find_in_body(path);
    if let Some(Value::String(text)) = actual {
        if regex.is_match(text) {
            return Ok(());
        }
    }
    fail(
        format!("response body at \"{path}\" does not match the pattern"),
        literal,
        describe(actual),
    )
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) or epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

pub fn close_to_now(view: &ResponseView, path: &PathExpr) -> Result<()> {
    close_to(view, path, Utc::now())
}

/// [`close_to_now`] with an explicit reference time.
pub fn close_to(view: &ResponseView, path: &PathExpr, now: DateTime<Utc>) -> Result<()> {
    let actual = view.find_in_body(path);
    let Some(ts) = actual.and_then(parse_timestamp) else {
        return fail(
            format!("response body at \"{path}\" is not a timestamp"),
            "timestamp",
            describe(actual),
        );
    };
    let delta_ms = (ts - now).num_milliseconds();
    if delta_ms.abs() > CLOSE_TO_NOW_TOLERANCE_SECS * 1000 {
        let delta = delta_ms as f64 / 1000.0;
        return fail(
            format!("response body at \"{path}\" is not close to now"),
            format!("within {CLOSE_TO_NOW_TOLERANCE_SECS}s of {}", now.to_rfc3339()),
            format!("{} (delta {delta}s)", ts.to_rfc3339()),
        );
    }
    Ok(())
}

/// Store a header value in the dataset; an absent header stores `null`.
pub fn capture_header(
    view: &ResponseView,
    name: &str,
    key: &str,
    data: &mut DataStore,
) -> Result<()> {
    let value = match view.find_in_header(name) {
        Some(v) => Value::String(v.to_string()),
        None => {
            warn!("response header \"{name}\" is absent, storing null as \"{key}\"");
            Value::Null
        }
    };
    debug!(header = name, key, "captured header into dataset");
    data.set(key, value)
}

/// Store a body property in the dataset; an absent property stores `null`.
pub fn capture_body(
    view: &ResponseView,
    path: &PathExpr,
    key: &str,
    data: &mut DataStore,
) -> Result<()> {
    let value = match view.find_in_body(path) {
        Some(v) => v.clone(),
        None => {
            warn!("response body at \"{path}\" is absent, storing null as \"{key}\"");
            Value::Null
        }
    };
    debug!(path = %path, key, "captured body property into dataset");
    data.set(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::tests::view;
    use chrono::Duration;
    use serde_json::json;

    fn json_view(body: Value) -> ResponseView {
        view(
            &[("content-type", "application/json"), ("x-req-id", "zz-xx-yy")],
            body,
        )
    }

    fn path(expr: &str) -> PathExpr {
        PathExpr::parse(expr).unwrap()
    }

    fn failure(result: Result<()>) -> AssertionFailure {
        match result {
            Err(Error::Assertion(failure)) => failure,
            other => panic!("expected assertion failure, got {other:?}"),
        }
    }

    #[test]
    fn test_status() {
        let response = json_view(Value::Null);
        assert!(status(&response, 200).is_ok());
        let failure = failure(status(&response, 404));
        assert_eq!(failure.expected, "404");
        assert_eq!(failure.actual, "200");
    }

    #[test]
    fn test_response_time_is_strict() {
        let response = json_view(Value::Null);
        assert!(response_time_under(&response, 13).is_ok());
        assert!(response_time_under(&response, 12).is_err());
    }

    #[test]
    fn test_headers() {
        let response = json_view(Value::Null);
        assert!(header_equals(&response, "X-Req-Id", "zz-xx-yy").is_ok());
        assert!(header_equals(&response, "x-req-id", "other").is_err());
        assert!(header_exists(&response, "X-REQ-ID").is_ok());
        assert!(header_exists(&response, "x-missing").is_err());
        assert!(header_absent(&response, "x-missing").is_ok());
        assert!(header_absent(&response, "x-req-id").is_err());
    }

    #[test]
    fn test_headers_table_resolves_placeholders() {
        let response = json_view(Value::Null);
        let mut data = DataStore::new();
        data.set("req_id", json!("zz-xx-yy")).unwrap();
        let table = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("x-req-id".to_string(), "{{ req_id }}".to_string()),
        ];
        assert!(headers_contain(&response, &table, &data).is_ok());
    }

    #[test]
    fn test_body_equality_variants() {
        let response = json_view(json!({
            "name": "john",
            "id": 10,
            "code": "42",
            "active": true,
            "deleted": false,
            "parent": null,
            "nickname": ""
        }));
        assert!(body_equals(&response, &path("name"), "john").is_ok());
        assert!(body_equals(&response, &path("$.id"), "10").is_ok());
        assert!(body_equals(&response, &path("name"), "doe").is_err());
        assert!(body_equals_int(&response, &path("id"), 10).is_ok());
        assert!(body_equals_int(&response, &path("code"), 42).is_ok());
        assert!(body_equals_int(&response, &path("id"), 11).is_err());
        assert!(body_true(&response, &path("active")).is_ok());
        assert!(body_true(&response, &path("deleted")).is_err());
        assert!(body_false(&response, &path("deleted")).is_ok());
        assert!(body_null(&response, &path("parent")).is_ok());
        assert!(body_null(&response, &path("missing")).is_err());
        assert!(body_empty(&response, &path("nickname")).is_ok());
        assert!(body_empty(&response, &path("parent")).is_err());
        assert!(body_not_null(&response, &path("name")).is_ok());
        assert!(body_not_null(&response, &path("parent")).is_err());
        assert!(body_not_null(&response, &path("missing")).is_err());
    }

    #[test]
    fn test_body_equals_int_is_exact_for_large_ids() {
        let response = json_view(json!({
            "id": 9_007_199_254_740_993i64,
            "code": "9007199254740993",
            "ratio": 2.0,
            "huge": u64::MAX
        }));
        assert!(body_equals_int(&response, &path("id"), 9_007_199_254_740_993).is_ok());
        assert!(body_equals_int(&response, &path("id"), 9_007_199_254_740_992).is_err());
        assert!(body_equals_int(&response, &path("code"), 9_007_199_254_740_993).is_ok());
        assert!(body_equals_int(&response, &path("code"), 9_007_199_254_740_992).is_err());
        assert!(body_equals_int(&response, &path("ratio"), 2).is_ok());
        assert!(body_equals_int(&response, &path("huge"), i64::MAX).is_err());
    }

    #[test]
    fn test_array_assertions() {
        let response = json_view(json!({"items": [1, 2, 3], "none": [], "text": "x"}));
        assert!(is_array(&response, &path("items")).is_ok());
        assert!(is_array(&response, &path("text")).is_err());
        assert!(array_of_len(&response, &path("$.items"), 3).is_ok());

        let failure = failure(array_of_len(&response, &path("items"), 2));
        assert_eq!(failure.expected, "2");
        assert_eq!(failure.actual, "3");

        assert!(non_empty_array(&response, &path("items")).is_ok());
        assert!(non_empty_array(&response, &path("none")).is_err());
        assert!(empty_array(&response, &path("none")).is_ok());
        assert!(empty_array(&response, &path("text")).is_err());
    }

    #[test]
    fn test_root_list_size() {
        let response = json_view(json!([{"id": 1}, {"id": 2}]));
        assert!(array_of_len(&response, &PathExpr::root(), 2).is_ok());
        assert!(non_empty_array(&response, &PathExpr::root()).is_ok());
    }

    #[test]
    fn test_response_is_empty() {
        assert!(response_is_empty(&json_view(Value::Null)).is_ok());
        assert!(response_is_empty(&json_view(json!({}))).is_ok());
        assert!(response_is_empty(&json_view(json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_regex_literals() {
        let response = json_view(json!({"job": "Airline Pilot"}));
        assert!(body_matches(&response, &path("job"), "/pilot/i").is_ok());
        assert!(body_matches(&response, &path("job"), "/pilot/").is_err());
        assert!(body_matches(&response, &path("job"), "^Airline").is_ok());
        assert!(matches!(
            parse_regex("/x/q"),
            Err(Error::InvalidRegex { .. })
        ));
        assert!(matches!(parse_regex("/(/"), Err(Error::InvalidRegex { .. })));
    }

    #[test]
    fn test_close_to_now() {
        let now = Utc::now();
        let recent = (now - Duration::seconds(30)).to_rfc3339();
        let old = (now - Duration::hours(2)).to_rfc3339();
        let response = json_view(json!({"recent": recent, "old": old, "bad": "nope"}));

        assert!(close_to(&response, &path("recent"), now).is_ok());
        let failure = failure(close_to(&response, &path("old"), now));
        assert!(failure.actual.contains("delta -7200s"));
        assert!(close_to(&response, &path("bad"), now).is_err());
    }

    #[test]
    fn test_close_to_now_boundary_uses_full_precision() {
        let now = Utc::now();
        let inside = (now - Duration::milliseconds(59_900)).to_rfc3339();
        let edge = (now - Duration::seconds(60)).to_rfc3339();
        let outside = (now - Duration::milliseconds(60_900)).to_rfc3339();
        let response = json_view(json!({"inside": inside, "edge": edge, "outside": outside}));

        assert!(close_to(&response, &path("inside"), now).is_ok());
        assert!(close_to(&response, &path("edge"), now).is_ok());
        let failure = failure(close_to(&response, &path("outside"), now));
        assert!(failure.actual.contains("delta -60.9s"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp(&json!("2024-05-01T10:00:00Z")).is_some());
        assert!(parse_timestamp(&json!("2024-05-01 10:00:00.123")).is_some());
        assert_eq!(
            parse_timestamp(&json!(1_714_557_600_000i64)).map(|t| t.timestamp()),
            Some(1_714_557_600)
        );
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn test_capture_into_dataset() {
        let response = json_view(json!({"user": {"id": 7}}));
        let mut data = DataStore::new();
        capture_body(&response, &path("$.user.id"), "user_id", &mut data).unwrap();
        capture_header(&response, "X-REQ-ID", "req_id", &mut data).unwrap();
        assert_eq!(data.lookup("user_id"), Some(&json!(7)));
        assert_eq!(data.lookup("req_id"), Some(&json!("zz-xx-yy")));
    }

    #[test]
    fn test_capture_absent_stores_null() {
        let response = json_view(json!({}));
        let mut data = DataStore::new();
        capture_body(&response, &path("missing"), "a", &mut data).unwrap();
        capture_header(&response, "x-missing", "b", &mut data).unwrap();
        assert_eq!(data.lookup("a"), Some(&Value::Null));
        assert_eq!(data.lookup("b"), Some(&Value::Null));
    }
}
