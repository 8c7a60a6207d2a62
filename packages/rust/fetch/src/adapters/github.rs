//! GitHub REST adapter (repository search and listing endpoints).

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{FetchAdapter, FetchRequest, extract_records, parse_json};
use crate::error::FetchError;
use crate::http::HttpFetcher;

/// GitHub caps `per_page` at 100.
const MAX_PER_PAGE: usize = 100;

pub struct GitHubAdapter {
    fetcher: HttpFetcher,
}

impl GitHubAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchAdapter for GitHubAdapter {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(skip_all, fields(source_id = %request.source.id))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        let url = &request.source.url;
        let mut http = request.http_get();
        if !request.has_param("per_page") {
            http.params
                .push(("per_page".into(), request.cap.clamp(1, MAX_PER_PAGE).to_string()));
        }
        http.headers
            .entry("Accept".into())
            .or_insert_with(|| "application/vnd.github+json".into());

        let response = self.fetcher.send(&http).await?.ensure_success(url)?;
        // Search responses wrap results in `items`; list endpoints return a bare array.
        let mut records = extract_records(parse_json(&response.body, url)?);
        records.truncate(request.cap);
        debug!(count = records.len(), "github records fetched");
        Ok(records)
    }
}
