//! Generic JSON REST adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{FetchAdapter, FetchRequest, parse_json};
use crate::error::FetchError;
use crate::http::HttpFetcher;

/// Wrapper keys searched for the record array, in order.
const RECORD_KEYS: &[&str] = &["results", "data", "items", "records", "hits", "entries"];

/// Fetches a JSON document and returns the record array inside it.
pub struct JsonApiAdapter {
    fetcher: HttpFetcher,
}

impl JsonApiAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchAdapter for JsonApiAdapter {
    fn name(&self) -> &str {
        "json_api"
    }

    #[instrument(skip_all, fields(source_id = %request.source.id))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        let url = &request.source.url;
        let response = self
            .fetcher
            .send(&request.http_get())
            .await?
            .ensure_success(url)?;
        let document = parse_json(&response.body, url)?;

        let mut records = extract_records(document);
        records.truncate(request.cap);
        debug!(count = records.len(), "json records extracted");
        Ok(records)
    }
}

/// Locate the record array in a JSON document.
///
/// Accepts a bare array, or an object holding one under a known wrapper key
/// (one level of nesting, e.g. `{"hits": {"hits": [...]}}`). A lone object is
/// treated as a single record.
pub fn extract_records(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            for key in RECORD_KEYS {
                match obj.remove(*key) {
                    Some(Value::Array(items)) => return items,
                    Some(nested @ Value::Object(_)) => {
                        let inner = extract_records(nested);
                        if !inner.is_empty() {
                            return inner;
                        }
                    }
                    _ => {}
                }
            }
            if obj.is_empty() {
                Vec::new()
            } else {
                vec![Value::Object(obj)]
            }
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom_shared::{HttpConfig, SourceDescriptor};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn finds_records_under_wrapper_keys() {
        assert_eq!(extract_records(json!([{"a": 1}, {"a": 2}])).len(), 2);
        assert_eq!(extract_records(json!({"data": [{"a": 1}]})).len(), 1);
        assert_eq!(
            extract_records(json!({"hits": {"total": 3, "hits": [{"a": 1}, {"a": 2}]}})).len(),
            2
        );
        assert_eq!(extract_records(json!({"title": "single"})).len(), 1);
        assert!(extract_records(json!(null)).is_empty());
    }

    #[tokio::test]
    async fn fetch_truncates_to_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "a"}, {"title": "b"}, {"title": "c"}, {"title": "d"}
                ]
            })))
            .mount(&server)
            .await;

        let adapter = JsonApiAdapter::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let source = SourceDescriptor::new("docs", format!("{}/api/docs", server.uri()));
        let records = adapter
            .fetch(&FetchRequest::new(source, 3, Duration::from_secs(5)))
            .await
            .expect("fetch");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["title"], "a");
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let adapter = JsonApiAdapter::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let source = SourceDescriptor::new("bad", server.uri());
        let err = adapter
            .fetch(&FetchRequest::new(source, 10, Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
