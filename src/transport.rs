//! The seam to the HTTP client that performs calls.

use crate::error::TransportFailure;
use crate::model::{HttpMethod, RequestOptions, TransportResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method as ReqMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Performs one HTTP call.
///
/// Any status code is a successful call. `Err` is reserved for calls
/// that produced no response at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        options: &RequestOptions,
    ) -> Result<TransportResult, TransportFailure>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    insecure_client: Client,
}

impl ReqwestTransport {
    /// Build clients with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportFailure> {
        let build = |insecure: bool| {
            Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| {
                    TransportFailure::new(format!(
                        "failed to build HTTP client: {e}"
                    ))
                })
        };
        Ok(Self {
            client: build(false)?,
            insecure_client: build(true)?,
        })
    }

    fn convert_method(method: HttpMethod) -> ReqMethod {
        match method {
            HttpMethod::Get => ReqMethod::GET,
            HttpMethod::Post => ReqMethod::POST,
            HttpMethod::Put => ReqMethod::PUT,
            HttpMethod::Delete => ReqMethod::DELETE,
            HttpMethod::Patch => ReqMethod::PATCH,
            HttpMethod::Head => ReqMethod::HEAD,
            HttpMethod::Options => ReqMethod::OPTIONS,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, options), fields(url = %options.url, method = %options.method))]
    async fn send(
        &self,
        options: &RequestOptions,
    ) -> Result<TransportResult, TransportFailure> {
        let client = if options.insecure {
            &self.insecure_client
        } else {
            &self.client
        };

        let mut req_builder =
            client.request(Self::convert_method(options.method), &options.url);
        for (name, value) in &options.headers {
            req_builder = req_builder.header(name, value);
        }
        if !options.query.is_empty() {
            req_builder = req_builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            req_builder = req_builder.json(body);
        }

        debug!("Sending request to {}", options.url);
        let started = Instant::now();
        let response = req_builder
            .send()
            .await
            .map_err(|e| TransportFailure::new(format!("failed to send request: {e}")))?;

        let status_code = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let text = response.text().await.map_err(|e| {
            TransportFailure::new(format!("failed to read response body: {e}"))
        })?;
        let timing_ms = started.elapsed().as_millis() as u64;
        debug!(status_code, timing_ms, "Received response");

        Ok(TransportResult {
            request: options.clone(),
            status_code,
            body: normalize_body(&headers, &text),
            headers,
            timing_ms,
        })
    }
}

/// Header values keyed by name. Non-ASCII bytes are decoded lossily and
/// repeated headers are joined with `", "`.
pub fn collect_headers(map: &HeaderMap) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::with_capacity(map.keys_len());
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    headers
}

/// JSON when the content type says so and the text parses, `null` for
/// an empty body, the raw text otherwise.
pub fn normalize_body(headers: &HashMap<String, String>, text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    let is_json = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .is_some_and(|(_, v)| v.to_ascii_lowercase().contains("json"));
    if is_json {
        if let Ok(json) = serde_json::from_str::<Value>(text) {
            return json;
        }
    }
    Value::String(text.to_string())
}
