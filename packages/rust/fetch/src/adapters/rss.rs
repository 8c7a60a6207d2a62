//! RSS / Atom feed adapter.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::{FetchAdapter, FetchRequest};
use crate::error::FetchError;
use crate::http::HttpFetcher;

pub struct RssAdapter {
    fetcher: HttpFetcher,
}

impl RssAdapter {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchAdapter for RssAdapter {
    fn name(&self) -> &str {
        "rss"
    }

    #[instrument(skip_all, fields(source_id = %request.source.id))]
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>, FetchError> {
        let url = &request.source.url;
        let response = self
            .fetcher
            .send(&request.http_get())
            .await?
            .ensure_success(url)?;

        let feed = feed_rs::parser::parse(response.body.as_bytes()).map_err(|e| {
            FetchError::Parse {
                url: url.clone(),
                message: format!("invalid RSS/Atom feed: {e}"),
            }
        })?;
        let feed_title = feed.title.map(|t| t.content).unwrap_or_default();

        let records: Vec<Value> = feed
            .entries
            .into_iter()
            .take(request.cap)
            .map(|entry| entry_to_record(entry, &feed_title))
            .collect();

        debug!(count = records.len(), "feed entries parsed");
        Ok(records)
    }
}

/// Flatten a feed entry into the `guid`-keyed record shape the normalizer expects.
fn entry_to_record(entry: feed_rs::model::Entry, feed_title: &str) -> Value {
    let mut record = Map::new();
    record.insert("guid".into(), json!(entry.id));

    if let Some(title) = entry.title {
        record.insert("title".into(), json!(title.content));
    }

    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));
    if let Some(link) = link {
        record.insert("link".into(), json!(link));
    }

    let body = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content));
    if let Some(body) = body {
        record.insert("content".into(), json!(body));
    }

    if let Some(published) = entry.published.or(entry.updated) {
        record.insert("published".into(), json!(published.to_rfc3339()));
    }

    let author = entry
        .authors
        .first()
        .map(|p| p.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| feed_title.to_string());
    if !author.is_empty() {
        record.insert("author".into(), json!(author));
    }

    if let Some(rights) = entry.rights {
        record.insert("rights".into(), json!(rights.content));
    }

    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom_shared::{HttpConfig, SourceDescriptor};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Agency News</title>
    <link>https://agency.example</link>
    <description>Updates</description>
    <item>
      <title>First notice</title>
      <link>https://agency.example/notices/1</link>
      <guid>https://agency.example/notices/1</guid>
      <description>&lt;p&gt;Comment period opens&lt;/p&gt;</description>
      <pubDate>Mon, 05 Oct 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second notice</title>
      <link>https://agency.example/notices/2</link>
      <guid>https://agency.example/notices/2</guid>
    </item>
    <item>
      <title>Third notice</title>
      <link>https://agency.example/notices/3</link>
      <guid>https://agency.example/notices/3</guid>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_feed_entries_up_to_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(FEED),
            )
            .mount(&server)
            .await;

        let adapter = RssAdapter::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let records = adapter
            .fetch(&FetchRequest::new(
                SourceDescriptor::new("news", server.uri()),
                2,
                Duration::from_secs(5),
            ))
            .await
            .expect("fetch");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "First notice");
        assert_eq!(records[0]["link"], "https://agency.example/notices/1");
        assert_eq!(records[0]["author"], "Agency News");
        assert!(records[0]["content"].as_str().unwrap().contains("Comment period"));
        assert!(records[0].get("published").is_some());
    }

    #[tokio::test]
    async fn malformed_feed_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .mount(&server)
            .await;

        let adapter = RssAdapter::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let err = adapter
            .fetch(&FetchRequest::new(
                SourceDescriptor::new("news", server.uri()),
                5,
                Duration::from_secs(5),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
