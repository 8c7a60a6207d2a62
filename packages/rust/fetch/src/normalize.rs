//! Raw record → [`ContentItem`] mapping.
//!
//! Sources return heterogeneous JSON shapes. Each known shape has a
//! [`FieldStrategy`] chosen by inspecting which keys are present; anything
//! unrecognized falls back to first-matching-key over common field names.
//! Normalization is pure: no I/O, never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use pressroom_shared::{ContentItem, CopyrightStatus, SourceDescriptor, UNTITLED};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(\s[^>]*)?/?>").expect("valid regex"));

const TITLE_KEYS: &[&str] = &["title", "name", "full_name"];
const BODY_KEYS: &[&str] = &["content", "description", "body", "summary", "abstract"];
const LINK_KEYS: &[&str] = &["url", "html_url", "link"];
const ID_KEYS: &[&str] = &["id", "document_number", "documentId", "number", "guid"];
const DATE_KEYS: &[&str] = &[
    "publication_date",
    "publicationDate",
    "published_at",
    "published",
    "pubDate",
    "date",
    "created_at",
];
const ATTRIBUTION_KEYS: &[&str] = &["attribution", "author", "creator", "publisher", "agency"];

/// Known record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrategy {
    /// `{id, type, attributes: {..}, links: {self}}`
    JsonApi,
    /// GitHub repository object (`full_name`, `html_url`, `owner`, `license`).
    GitHubRepository,
    /// Federal Register document (`document_number`, `abstract`, `agencies`).
    FederalRegister,
    /// Entry produced by the RSS adapter (`guid`, `link`, `published`).
    RssEntry,
    Generic,
}

impl FieldStrategy {
    pub fn detect(record: &Map<String, Value>) -> Self {
        if record.get("attributes").is_some_and(Value::is_object) {
            Self::JsonApi
        } else if record.contains_key("full_name") && record.contains_key("html_url") {
            Self::GitHubRepository
        } else if record.contains_key("document_number")
            && (record.contains_key("agencies") || record.contains_key("abstract"))
        {
            Self::FederalRegister
        } else if record.contains_key("guid") {
            Self::RssEntry
        } else {
            Self::Generic
        }
    }
}

/// Map one raw record to a [`ContentItem`] owned by `source`.
pub fn normalize(raw: &Value, source: &SourceDescriptor) -> ContentItem {
    let empty = Map::new();
    let record = raw.as_object().unwrap_or(&empty);
    let strategy = FieldStrategy::detect(record);

    let item = match strategy {
        FieldStrategy::JsonApi => json_api(record, source),
        FieldStrategy::GitHubRepository => github(record, source),
        FieldStrategy::FederalRegister => federal_register(record, source),
        FieldStrategy::RssEntry | FieldStrategy::Generic => generic(record, source),
    };

    debug!(?strategy, source_id = %source.id, title = %item.title, "record normalized");
    item
}

fn generic(record: &Map<String, Value>, source: &SourceDescriptor) -> ContentItem {
    let identifier = first_string(record, ID_KEYS);
    let title = first_string(record, TITLE_KEYS)
        .or_else(|| identifier.clone())
        .unwrap_or_else(|| UNTITLED.to_string());
    let link = first_link(record)
        .or_else(|| templated_link(source, identifier.as_deref()))
        .unwrap_or_default();

    let mut item = ContentItem::new(title, link, &source.id);
    item.body = first_string(record, BODY_KEYS)
        .map(|b| clean_body(&b))
        .unwrap_or_default();
    item.publication_date = first_string(record, DATE_KEYS).unwrap_or_default();
    item.document_number = first_string(record, &["document_number", "documentNumber"])
        .unwrap_or_default();
    item.attribution = first_string(record, ATTRIBUTION_KEYS).unwrap_or_default();
    item.copyright_status = copyright(record);
    item
}

fn json_api(record: &Map<String, Value>, source: &SourceDescriptor) -> ContentItem {
    // Lift attributes to the top level; outer id and links.self fill gaps.
    let mut flat = record
        .get("attributes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(id) = record.get("id") {
        flat.entry("id".to_string()).or_insert_with(|| id.clone());
    }
    if let Some(self_link) = record
        .get("links")
        .and_then(|l| l.get("self"))
        .filter(|v| v.is_string())
    {
        flat.entry("url".to_string())
            .or_insert_with(|| self_link.clone());
    }
    generic(&flat, source)
}

fn github(record: &Map<String, Value>, source: &SourceDescriptor) -> ContentItem {
    let title = first_string(record, &["full_name", "name"]).unwrap_or_else(|| UNTITLED.into());
    // `url` on GitHub objects is the API endpoint, not the page.
    let link = first_string(record, &["html_url"]).unwrap_or_default();

    let mut item = ContentItem::new(title, link, &source.id);
    item.body = first_string(record, &["description"]).unwrap_or_default();
    item.publication_date =
        first_string(record, &["pushed_at", "updated_at", "created_at"]).unwrap_or_default();
    item.attribution = record
        .get("owner")
        .and_then(|o| o.get("login"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    item.copyright_status = copyright(record);
    item
}

fn federal_register(record: &Map<String, Value>, source: &SourceDescriptor) -> ContentItem {
    let document_number = first_string(record, &["document_number"]).unwrap_or_default();
    let title = first_string(record, TITLE_KEYS)
        .or_else(|| (!document_number.is_empty()).then(|| document_number.clone()))
        .unwrap_or_else(|| UNTITLED.into());
    let link = first_string(record, &["html_url", "url", "pdf_url"])
        .or_else(|| templated_link(source, Some(document_number.as_str())))
        .unwrap_or_default();

    let mut item = ContentItem::new(title, link, &source.id);
    item.body = first_string(record, &["abstract", "excerpts", "description"])
        .map(|b| clean_body(&b))
        .unwrap_or_default();
    item.publication_date = first_string(record, &["publication_date"]).unwrap_or_default();
    item.document_number = document_number;
    item.attribution = record
        .get("agencies")
        .and_then(Value::as_array)
        .map(|agencies| {
            agencies
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default();
    // US federal government works.
    item.copyright_status = CopyrightStatus::PublicDomain;
    item
}

/// First non-empty value among `keys`, rendering numbers as strings.
fn first_string(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => ["name", "login", "content"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string()),
        _ => None,
    })
}

/// Link keys may hold a string or an `{href}` object.
fn first_link(record: &Map<String, Value>) -> Option<String> {
    LINK_KEYS.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(obj) => obj
            .get("href")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn templated_link(source: &SourceDescriptor, identifier: Option<&str>) -> Option<String> {
    let template = source.link_template.as_deref()?;
    let id = identifier.filter(|id| !id.is_empty())?;
    Some(template.replace("{id}", id))
}

/// `license` / `copyright` as a structured object or plain string.
fn copyright(record: &Map<String, Value>) -> CopyrightStatus {
    let label = ["license", "copyright", "rights"]
        .iter()
        .find_map(|key| match record.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => ["spdx_id", "key", "name"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        });

    match label {
        None => CopyrightStatus::Unknown,
        Some(label) => classify_license(&label),
    }
}

fn classify_license(label: &str) -> CopyrightStatus {
    let lower = label.trim().to_lowercase();
    if lower.is_empty() || lower == "noassertion" || lower == "other" {
        CopyrightStatus::Unknown
    } else if lower.contains("public domain")
        || lower.contains("public_domain")
        || lower.starts_with("cc0")
        || lower == "unlicense"
    {
        CopyrightStatus::PublicDomain
    } else {
        CopyrightStatus::Licensed
    }
}

/// Convert HTML bodies to Markdown; plain text passes through.
fn clean_body(body: &str) -> String {
    if !HTML_TAG.is_match(body) {
        return body.to_string();
    }
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript", "svg"])
        .build();
    match converter.convert(body) {
        Ok(markdown) => markdown.trim().to_string(),
        Err(e) => {
            debug!(error = %e, "htmd conversion failed; keeping raw body");
            body.to_string()
        }
    }
}
