//! Timeout-bounded HTTP client shared by all fetch adapters.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method};
use tracing::debug;

use pressroom_shared::{HttpConfig, PipelineError, Result};

use crate::error::FetchError;

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Query-string pairs, in order. Repeated keys are allowed.
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: BTreeMap::new(),
            params: Vec::new(),
            timeout,
        }
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

impl HttpResponse {
    /// Fail with [`FetchError::Status`] unless the status is 2xx.
    pub fn ensure_success(self, url: &str) -> std::result::Result<Self, FetchError> {
        if (200..300).contains(&self.status_code) {
            Ok(self)
        } else {
            Err(FetchError::Status {
                url: url.to_string(),
                status: self.status_code,
            })
        }
    }
}

/// Cloneable HTTP client with a configured user agent and default timeouts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    short_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PipelineError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            short_timeout: Duration::from_secs(config.short_timeout_secs),
        })
    }

    /// Default timeout for fetches and metadata requests.
    pub fn short_timeout(&self) -> Duration {
        self.short_timeout
    }

    /// Send `request`. Non-2xx statuses are returned, not raised.
    pub async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, FetchError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, &request.url, request.timeout))?;
        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, &request.url, request.timeout))?;

        debug!(url = %request.url, status_code, bytes = body.len(), "response received");
        Ok(HttpResponse { status_code, body })
    }
}

fn classify(err: reqwest::Error, url: &str, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Flatten free-form source params into query pairs.
///
/// Arrays become repeated keys; nulls are dropped; nested objects are sent as JSON.
pub fn query_pairs(params: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    use serde_json::Value;

    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::String(s) => pairs.push((key.clone(), s.clone())),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => pairs.push((key.clone(), s.clone())),
                        Value::Null => {}
                        other => pairs.push((key.clone(), other.to_string())),
                    }
                }
            }
            other => pairs.push((key.clone(), other.to_string())),
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpConfig::default()).expect("client")
    }

    #[test]
    fn query_pairs_expand_arrays_and_skip_nulls() {
        let params = json!({
            "q": "clean air",
            "per_page": 5,
            "conditions[agencies][]": ["epa", "doe"],
            "skip": null
        });
        let pairs = query_pairs(params.as_object().unwrap());
        assert!(pairs.contains(&("q".into(), "clean air".into())));
        assert!(pairs.contains(&("per_page".into(), "5".into())));
        assert_eq!(
            pairs.iter().filter(|(k, _)| k == "conditions[agencies][]").count(),
            2
        );
        assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    }

    #[tokio::test]
    async fn send_passes_params_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("q", "rust"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let mut request = HttpRequest::get(format!("{}/items", server.uri()), Duration::from_secs(5));
        request.params.push(("q".into(), "rust".into()));
        request.headers.insert("x-api-key".into(), "secret".into());

        let response = fetcher().send(&request).await.expect("send");
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "[]");
    }

    #[tokio::test]
    async fn non_success_status_is_returned_then_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = server.uri();
        let response = fetcher()
            .send(&HttpRequest::get(&url, Duration::from_secs(5)))
            .await
            .expect("send");
        assert_eq!(response.status_code, 500);
        assert!(matches!(
            response.ensure_success(&url),
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = fetcher()
            .send(&HttpRequest::get(server.uri(), Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err}");
    }
}
