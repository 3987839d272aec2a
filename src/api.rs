//! One request/response pair made during a scenario.

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::model::ApiSnapshot;
use crate::request::Request;
use crate::response::ResponseView;
use crate::transport::Transport;
use tracing::{error, info, instrument};

#[derive(Debug)]
pub struct Api {
    request: Request,
    response: Option<ResponseView>,
    error: Option<String>,
}

impl Api {
    /// Start a call against `gateway`, or the environment default.
    pub fn new(environment: &Environment, gateway: Option<String>) -> Self {
        let gateway = gateway
            .or_else(|| environment.url.clone())
            .unwrap_or_default();
        Self {
            request: Request::new(gateway, environment.insecure),
            response: None,
            error: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> Option<&ResponseView> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Send the request. HTTP error statuses still produce a response;
    /// only a transport failure leaves the response empty.
    #[instrument(skip_all)]
    pub async fn run<T>(&mut self, transport: &T) -> Result<&ResponseView>
    where
        T: Transport + ?Sized,
    {
        self.response = None;
        self.error = None;

        let options = self.request.get_options().map_err(|err| {
            self.error = Some(err.to_string());
            err
        })?;

        match transport.send(&options).await {
            Ok(result) => {
                info!(
                    "{} {} -> {} ({} ms)",
                    options.method, options.url, result.status_code, result.timing_ms
                );
                Ok(self.response.insert(ResponseView::new(result)))
            }
            Err(failure) => {
                error!("Request to {} failed: {}", options.url, failure);
                self.error = Some(failure.message.clone());
                Err(Error::Transport(failure))
            }
        }
    }

    pub fn snapshot(&self) -> ApiSnapshot {
        ApiSnapshot {
            request: self.request.get_options().ok(),
            response: self.response.as_ref().map(|r| r.get_result().clone()),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::TransportFailure;
    use crate::model::{RequestOptions, TransportResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies with a fixed status/body and records what was sent.
    pub(crate) struct StubTransport {
        pub status: u16,
        pub body: Value,
        pub headers: HashMap<String, String>,
        pub sent: Mutex<Vec<RequestOptions>>,
    }

    impl StubTransport {
        pub(crate) fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                body,
                headers: HashMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(
            &self,
            options: &RequestOptions,
        ) -> std::result::Result<TransportResult, TransportFailure> {
            self.sent.lock().unwrap().push(options.clone());
            Ok(TransportResult {
                request: options.clone(),
                status_code: self.status,
                headers: self.headers.clone(),
                body: self.body.clone(),
                timing_ms: 5,
            })
        }
    }

    pub(crate) struct FailingTransport(pub &'static str);

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(
            &self,
            _options: &RequestOptions,
        ) -> std::result::Result<TransportResult, TransportFailure> {
            Err(TransportFailure::new(self.0))
        }
    }

    pub(crate) fn environment() -> Environment {
        Environment {
            name: "test".into(),
            url: Some("http://test.com".into()),
            ..Environment::default()
        }
    }

    #[tokio::test]
    async fn test_successful_call_produces_response() {
        let mut api = Api::new(&environment(), None);
        let transport = StubTransport::json(201, json!({"id": 1}));
        let response = api.run(&transport).await.unwrap();
        assert_eq!(response.status_code(), 201);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].url, "http://test.com/");
    }

    #[tokio::test]
    async fn test_http_error_status_is_still_a_response() {
        let mut api = Api::new(&environment(), None);
        let transport = StubTransport::json(401, json!({"error": "unauthorized"}));
        api.run(&transport).await.unwrap();

        let snapshot = api.snapshot();
        assert_eq!(snapshot.response.unwrap().status_code, 401);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_records_error() {
        let mut api = Api::new(&environment(), None);
        let err = api.run(&FailingTransport("Random error")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(api.response().is_none());

        let snapshot = api.snapshot();
        assert!(snapshot.response.is_none());
        assert_eq!(snapshot.error.as_deref(), Some("Random error"));
        assert_eq!(snapshot.request.unwrap().url, "http://test.com/");
    }

    #[test]
    fn test_explicit_gateway_overrides_environment() {
        let api = Api::new(&environment(), Some("http://example.test".into()));
        assert_eq!(api.request().gateway(), "http://example.test");
    }
}
