//! Typed step definitions and their handlers.
//!
//! Each documented step phrase maps to one [`Step`] variant. Runners
//! that match human-readable phrases only need to produce the variant;
//! [`Step::execute`] applies it to a [`ScenarioContext`].

use crate::assertion;
use crate::context::ScenarioContext;
use crate::data::value_to_text;
use crate::error::Result;
use crate::response::PathExpr;
use crate::transport::Transport;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument};

/// Rows of a two-column data table.
pub type Table = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyword {
    Given,
    When,
    Then,
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Keyword::Given => "Given",
            Keyword::When => "When",
            Keyword::Then => "Then",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    // Given
    Gateway {
        #[serde(default)]
        url: Option<String>,
    },
    Path {
        path: String,
    },
    Method {
        method: String,
    },
    MethodPath {
        method: String,
        path: String,
    },
    Header {
        name: String,
        value: String,
    },
    Headers {
        headers: Table,
    },
    Bearer {
        token: String,
    },
    BasicAuth {
        user: String,
        password: String,
    },
    QueryString {
        name: String,
        value: Value,
    },
    QueryStrings {
        params: Table,
    },
    Payload {
        path: String,
        value: Value,
    },
    PayloadNull {
        path: String,
    },
    PayloadTrue {
        path: String,
    },
    PayloadFalse {
        path: String,
    },
    PayloadEmptyArray {
        path: String,
    },
    Payloads {
        payload: Table,
    },

    // When
    Run,

    // Then
    Status {
        status: u16,
    },
    ResponseTimeUnder {
        ms: u64,
    },
    HeaderEquals {
        name: String,
        value: String,
    },
    HeadersContain {
        headers: Table,
    },
    HeaderExists {
        name: String,
    },
    HeaderAbsent {
        name: String,
    },
    EmptyArrayResponse,
    NonEmptyArrayResponse,
    EmptyResponse,
    BodyEquals {
        path: String,
        value: String,
    },
    BodyEqualsInt {
        path: String,
        value: i64,
    },
    BodyTrue {
        path: String,
    },
    BodyFalse {
        path: String,
    },
    BodyNull {
        path: String,
    },
    BodyEmpty {
        path: String,
    },
    BodyIsArray {
        path: String,
    },
    BodyArrayOf {
        path: String,
        count: usize,
    },
    BodyCloseToNow {
        path: String,
    },
    BodyNotNull {
        path: String,
    },
    BodyMatches {
        path: String,
        pattern: String,
    },
    ListSize {
        count: usize,
    },
    CaptureHeader {
        name: String,
        key: String,
    },
    CaptureBody {
        path: String,
        key: String,
    },
}

impl Step {
    /// Stable identifier, identical to the serialized `step` tag.
    pub fn id(&self) -> &'static str {
        match self {
            Step::Gateway { .. } => "gateway",
            Step::Path { .. } => "path",
            Step::Method { .. } => "method",
            Step::MethodPath { .. } => "method_path",
            Step::Header { .. } => "header",
            Step::Headers { .. } => "headers",
            Step::Bearer { .. } => "bearer",
            Step::BasicAuth { .. } => "basic_auth",
            Step::QueryString { .. } => "query_string",
            Step::QueryStrings { .. } => "query_strings",
            Step::Payload { .. } => "payload",
            Step::PayloadNull { .. } => "payload_null",
            Step::PayloadTrue { .. } => "payload_true",
            Step::PayloadFalse { .. } => "payload_false",
            Step::PayloadEmptyArray { .. } => "payload_empty_array",
            Step::Payloads { .. } => "payloads",
            Step::Run => "run",
            Step::Status { .. } => "status",
            Step::ResponseTimeUnder { .. } => "response_time_under",
            Step::HeaderEquals { .. } => "header_equals",
            Step::HeadersContain { .. } => "headers_contain",
            Step::HeaderExists { .. } => "header_exists",
            Step::HeaderAbsent { .. } => "header_absent",
            Step::EmptyArrayResponse => "empty_array_response",
            Step::NonEmptyArrayResponse => "non_empty_array_response",
            Step::EmptyResponse => "empty_response",
            Step::BodyEquals { .. } => "body_equals",
            Step::BodyEqualsInt { .. } => "body_equals_int",
            Step::BodyTrue { .. } => "body_true",
            Step::BodyFalse { .. } => "body_false",
            Step::BodyNull { .. } => "body_null",
            Step::BodyEmpty { .. } => "body_empty",
            Step::BodyIsArray { .. } => "body_is_array",
            Step::BodyArrayOf { .. } => "body_array_of",
            Step::BodyCloseToNow { .. } => "body_close_to_now",
            Step::BodyNotNull { .. } => "body_not_null",
            Step::BodyMatches { .. } => "body_matches",
            Step::ListSize { .. } => "list_size",
            Step::CaptureHeader { .. } => "capture_header",
            Step::CaptureBody { .. } => "capture_body",
        }
    }

    pub fn keyword(&self) -> Keyword {
        CATALOG
            .iter()
            .find(|doc| doc.id == self.id())
            .map_or(Keyword::Then, |doc| doc.keyword)
    }

    /// Apply the step to the scenario. Only [`Step::Run`] uses the
    /// transport.
    #[instrument(skip_all, fields(step = self.id()))]
    pub async fn execute<T>(&self, ctx: &mut ScenarioContext, transport: &T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        debug!("executing step");
        match self {
            Step::Gateway { url } => {
                let url = url.as_deref().map(|u| ctx.data().resolve(u)).transpose()?;
                ctx.create_api(url);
            }
            Step::Path { path } => {
                let path = ctx.data().resolve(path)?;
                ctx.api_mut()?.request_mut().set_path(path);
            }
            Step::Method { method } => {
                let method = ctx.data().resolve(method)?;
                ctx.api_mut()?.request_mut().set_method(&method)?;
            }
            Step::MethodPath { method, path } => {
                let method = ctx.data().resolve(method)?;
                let path = ctx.data().resolve(path)?;
                ctx.api_mut()?.request_mut().method_path(&method, path)?;
            }
            Step::Header { name, value } => {
                let value = ctx.data().resolve(value)?;
                ctx.api_mut()?.request_mut().set_header(name, value);
            }
            Step::Headers { headers } => {
                let headers = resolve_table(ctx, headers)?;
                ctx.api_mut()?.request_mut().set_headers(headers);
            }
            Step::Bearer { token } => {
                let token = ctx.data().resolve(token)?;
                ctx.api_mut()?
                    .request_mut()
                    .set_header("authorization", format!("Bearer {token}"));
            }
            Step::BasicAuth { user, password } => {
                let user = ctx.data().resolve(user)?;
                let password = ctx.data().resolve(password)?;
                ctx.api_mut()?
                    .request_mut()
                    .set_header("authorization", basic_auth(&user, &password));
            }
            Step::QueryString { name, value } => {
                let value = value_to_text(&ctx.data().get(value)?);
                ctx.api_mut()?.request_mut().set_query_string(name, value);
            }
            Step::QueryStrings { params } => {
                let params = resolve_table(ctx, params)?;
                ctx.api_mut()?.request_mut().set_query_strings(params);
            }
            Step::Payload { path, value } => {
                let value = ctx.data().get(value)?;
                ctx.api_mut()?.request_mut().add_payload(path, value)?;
            }
            Step::PayloadNull { path } => {
                ctx.api_mut()?.request_mut().add_payload_null(path)?;
            }
            Step::PayloadTrue { path } => {
                ctx.api_mut()?.request_mut().add_payload_bool(path, true)?;
            }
            Step::PayloadFalse { path } => {
                ctx.api_mut()?.request_mut().add_payload_bool(path, false)?;
            }
            Step::PayloadEmptyArray { path } => {
                ctx.api_mut()?.request_mut().add_payload_empty_array(path)?;
            }
            Step::Payloads { payload } => {
                let mut rows = Vec::with_capacity(payload.len());
                for (path, value) in payload {
                    rows.push((path, ctx.data().get(&Value::String(value.clone()))?));
                }
                let request = ctx.api_mut()?.request_mut();
                for (path, value) in rows {
                    request.add_payload(path, value)?;
                }
            }
            Step::Run => {
                ctx.api_mut()?.run(transport).await?;
            }
            Step::Status { status } => assertion::status(ctx.response()?, *status)?,
            Step::ResponseTimeUnder { ms } => {
                assertion::response_time_under(ctx.response()?, *ms)?
            }
            Step::HeaderEquals { name, value } => {
                let expected = ctx.data().resolve(value)?;
                assertion::header_equals(ctx.response()?, name, &expected)?
            }
            Step::HeadersContain { headers } => {
                assertion::headers_contain(ctx.response()?, headers, ctx.data())?
            }
            Step::HeaderExists { name } => assertion::header_exists(ctx.response()?, name)?,
            Step::HeaderAbsent { name } => assertion::header_absent(ctx.response()?, name)?,
            Step::EmptyArrayResponse => {
                assertion::empty_array(ctx.response()?, &PathExpr::root())?
            }
            Step::NonEmptyArrayResponse => {
                assertion::non_empty_array(ctx.response()?, &PathExpr::root())?
            }
            Step::EmptyResponse => assertion::response_is_empty(ctx.response()?)?,
            Step::BodyEquals { path, value } => {
                let expected = ctx.data().resolve(value)?;
                assertion::body_equals(ctx.response()?, &PathExpr::parse(path)?, &expected)?
            }
            Step::BodyEqualsInt { path, value } => {
                assertion::body_equals_int(ctx.response()?, &PathExpr::parse(path)?, *value)?
            }
            Step::BodyTrue { path } => {
                assertion::body_true(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyFalse { path } => {
                assertion::body_false(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyNull { path } => {
                assertion::body_null(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyEmpty { path } => {
                assertion::body_empty(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyIsArray { path } => {
                assertion::is_array(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyArrayOf { path, count } => {
                assertion::array_of_len(ctx.response()?, &PathExpr::parse(path)?, *count)?
            }
            Step::BodyCloseToNow { path } => {
                assertion::close_to_now(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyNotNull { path } => {
                assertion::body_not_null(ctx.response()?, &PathExpr::parse(path)?)?
            }
            Step::BodyMatches { path, pattern } => {
                assertion::body_matches(ctx.response()?, &PathExpr::parse(path)?, pattern)?
            }
            Step::ListSize { count } => {
                assertion::array_of_len(ctx.response()?, &PathExpr::root(), *count)?
            }
            Step::CaptureHeader { name, key } => {
                let (response, data) = ctx.response_and_data()?;
                assertion::capture_header(response, name, key, data)?
            }
            Step::CaptureBody { path, key } => {
                let path = PathExpr::parse(path)?;
                let (response, data) = ctx.response_and_data()?;
                assertion::capture_body(response, &path, key, data)?
            }
        }
        Ok(())
    }
}

fn resolve_table(ctx: &ScenarioContext, table: &Table) -> Result<Table> {
    table
        .iter()
        .map(|(name, value)| Ok((name.clone(), ctx.data().resolve(value)?)))
        .collect()
}

/// `Basic` authorization header value for a user/password pair.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Documentation of one step for listings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StepDoc {
    pub keyword: Keyword,
    pub id: &'static str,
    pub phrase: &'static str,
    pub description: &'static str,
}

const fn doc(
    keyword: Keyword,
    id: &'static str,
    phrase: &'static str,
    description: &'static str,
) -> StepDoc {
    StepDoc {
        keyword,
        id,
        phrase,
        description,
    }
}

pub const CATALOG: &[StepDoc] = &[
    doc(Keyword::Given, "gateway", "I have the api gateway [hosted on {string}]", "Create a new api request targeting the default or a given api gateway"),
    doc(Keyword::Given, "path", "I have the path {string}", "Add the path of the request (ex: /users/{{ userId }})"),
    doc(Keyword::Given, "method", "I have the method {string}", "Add the method to the request (GET, POST, PUT, PATCH, DELETE, OPTIONS, HEAD)"),
    doc(Keyword::Given, "method_path", "I send a {string} request to {string}", "Add the method and the path of the request"),
    doc(Keyword::Given, "header", "the header contains {string} as {string}", "Add a value to the request headers"),
    doc(Keyword::Given, "headers", "I add the headers:", "Add multiple headers to the request (table format)"),
    doc(Keyword::Given, "bearer", "I have the bearer token {string}", "Set the bearer token into the authorization header"),
    doc(Keyword::Given, "basic_auth", "I have the basic auth {string} {string}", "Set basic credentials into the authorization header"),
    doc(Keyword::Given, "query_string", "the query parameter contains {string} as {string|int}", "Add a value to the request query parameters"),
    doc(Keyword::Given, "query_strings", "I add the query string parameters:", "Add multiple query parameters to the request (table format)"),
    doc(Keyword::Given, "payload", "the payload contains {string} as {string|int|float}", "Add a property to the request body (dot-object path)"),
    doc(Keyword::Given, "payload_null", "the payload contains {string} as null", "Add a null property to the request body"),
    doc(Keyword::Given, "payload_true", "the payload contains {string} as true", "Add a true property to the request body"),
    doc(Keyword::Given, "payload_false", "the payload contains {string} as false", "Add a false property to the request body"),
    doc(Keyword::Given, "payload_empty_array", "the payload contains {string} as empty array", "Add an empty array property to the request body"),
    doc(Keyword::Given, "payloads", "I add the request body:", "Add multiple properties to the request body (table format)"),
    doc(Keyword::When, "run", "I run the API", "Send the request"),
    doc(Keyword::Then, "status", "I should receive a response with the status {int}", "Check the response http code"),
    doc(Keyword::Then, "response_time_under", "the response time is under {int} ms", "Check the response latency"),
    doc(Keyword::Then, "header_equals", "the header {string} should be {string}", "Check a response header has the exact string value"),
    doc(Keyword::Then, "headers_contain", "the response headers should contains:", "Check multiple response headers (table format)"),
    doc(Keyword::Then, "header_exists", "{string} should be on the response header", "Check a property is in the response header"),
    doc(Keyword::Then, "header_absent", "{string} should not be on the response header", "Check a property is not in the response header"),
    doc(Keyword::Then, "empty_array_response", "the response should be empty array", "Check the response body is an empty array"),
    doc(Keyword::Then, "non_empty_array_response", "the response should not be empty array", "Check the response body is a non-empty array"),
    doc(Keyword::Then, "empty_response", "the response should be empty", "Check the response body is empty"),
    doc(Keyword::Then, "body_equals", "the response body at {string} should equal {string}", "Check a body value as a string"),
    doc(Keyword::Then, "body_equals_int", "the response body at {string} should equal {int}", "Check a body value as a number"),
    doc(Keyword::Then, "body_true", "the response body at {string} should equal true", "Check a body value is true"),
    doc(Keyword::Then, "body_false", "the response body at {string} should equal false", "Check a body value is false"),
    doc(Keyword::Then, "body_null", "the response body at {string} should equal null", "Check a body value is null"),
    doc(Keyword::Then, "body_empty", "the response body at {string} should equal empty", "Check a body value is an empty string"),
    doc(Keyword::Then, "body_is_array", "the response body at {string} should be an array", "Check a body value is an array"),
    doc(Keyword::Then, "body_array_of", "the response body at {string} should be an array of {int} item(s)", "Check a body value is an array of a given size"),
    doc(Keyword::Then, "body_close_to_now", "the response body at {string} should equal close to now", "Check a body date is within one minute of now"),
    doc(Keyword::Then, "body_not_null", "the response body at {string} should not be null", "Check a body value is not null"),
    doc(Keyword::Then, "body_matches", "the response body at {string} should match {string}", "Check a body value matches a regular expression"),
    doc(Keyword::Then, "list_size", "the response list should contain {int} item(s)", "Check the response list size"),
    doc(Keyword::Then, "capture_header", "add the value {string} from the response header to the dataset as {string}", "Store a response header value in the dataset"),
    doc(Keyword::Then, "capture_body", "add the value {string} from the response body to the dataset as {string}", "Store a response body value in the dataset"),
];

/// Catalog entries for one keyword, or all of them.
pub fn catalog(keyword: Option<Keyword>) -> impl Iterator<Item = &'static StepDoc> {
    CATALOG
        .iter()
        .filter(move |doc| keyword.map_or(true, |k| doc.keyword == k))
}
