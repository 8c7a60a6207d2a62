//! HTML listing-page adapter.
//!
//! Selects item links on a listing page with a CSS selector (source param
//! `item_selector`, default `a[href]`) and returns one record per distinct link.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::{FetchAdapter, FetchRequest};
use crate::error::FetchError;
use crate::http::HttpFetcher;

const DEFAULT_ITEM_SELECTOR: &str = "a[href]";

pub struct HtmlListingAdapter {
    fetcher: HttpFetcher,
}

impl HtmlListingAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchAdapter for HtmlListingAdapter {
    fn name(&self) -> &str {
        "html"
    }

    #[instrument(skip_all, fields(source_id = %request.source.id))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        let url = &request.source.url;
        let base = Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("bad source URL '{url}': {e}")))?;

        // The selector is a display hint, not a query parameter.
        let selector_str = request
            .source
            .params
            .get("item_selector")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ITEM_SELECTOR)
            .to_string();
        let mut http = request.http_get();
        http.params.retain(|(k, _)| k != "item_selector");

        let response = self.fetcher.send(&http).await?.ensure_success(url)?;
        let records = extract_links(&response.body, &base, &selector_str, request.cap)?;
        debug!(count = records.len(), selector = %selector_str, "listing links extracted");
        Ok(records)
    }
}

/// Collect `{title, link}` records from elements matching `selector`.
///
/// A matched element that is not itself a link contributes its first `a[href]`.
fn extract_links(
    html: &str,
    base: &Url,
    selector: &str,
    cap: usize,
) -> Result<Vec<Value>, FetchError> {
    let item_sel = Selector::parse(selector)
        .map_err(|e| FetchError::InvalidRequest(format!("bad item_selector '{selector}': {e}")))?;
    let anchor_sel = Selector::parse("a[href]")
        .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for el in doc.select(&item_sel) {
        if records.len() >= cap {
            break;
        }
        let anchor = if el.value().name() == "a" {
            Some(el)
        } else {
            el.select(&anchor_sel).next()
        };
        let Some(anchor) = anchor else { continue };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(link) = base.join(href) else { continue };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }

        let title = collapse_whitespace(&anchor.text().collect::<String>());
        if title.is_empty() || !seen.insert(link.to_string()) {
            continue;
        }

        // Text outside the anchor serves as a summary.
        let text = collapse_whitespace(&el.text().collect::<String>());
        let summary = text.strip_prefix(&title).unwrap_or(&text).trim().to_string();

        let mut record = json!({"title": title, "link": link.to_string()});
        if !summary.is_empty() {
            record["summary"] = json!(summary);
        }
        records.push(record);
    }

    Ok(records)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
