//! Federal Register documents API adapter.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{FetchAdapter, FetchRequest, parse_json};
use crate::error::FetchError;
use crate::http::HttpFetcher;

pub struct FederalRegisterAdapter {
    fetcher: HttpFetcher,
}

impl FederalRegisterAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchAdapter for FederalRegisterAdapter {
    fn name(&self) -> &str {
        "federal_register"
    }

    #[instrument(skip_all, fields(source_id = %request.source.id))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        let url = &request.source.url;
        let mut http = request.http_get();
        if !request.has_param("per_page") {
            http.params
                .push(("per_page".into(), request.cap.max(1).to_string()));
        }
        if !request.has_param("order") {
            http.params.push(("order".into(), "newest".into()));
        }

        let response = self.fetcher.send(&http).await?.ensure_success(url)?;
        let mut document = parse_json(&response.body, url)?;

        // An empty result set omits `results` entirely.
        let mut records = match document.get_mut("results").map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(FetchError::Parse {
                    url: url.clone(),
                    message: format!("`results` is not an array: {other}"),
                });
            }
        };
        records.truncate(request.cap);
        debug!(count = records.len(), "federal register documents fetched");
        Ok(records)
    }
}
