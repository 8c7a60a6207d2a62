//! Core domain types: content items, stage collections, and sources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder title for records that arrive without one.
pub const UNTITLED: &str = "Untitled";

// ---------------------------------------------------------------------------
// StageCollection
// ---------------------------------------------------------------------------

/// One of the six persistent collections an item can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageCollection {
    /// Intake: fetched and normalized, not yet scored.
    #[default]
    Candidates,
    /// Human-review queue.
    Approvals,
    /// Generation queue.
    Content,
    /// Publish-ready.
    Releases,
    /// Terminal success.
    Published,
    /// Terminal rejection / low score.
    Archives,
}

impl StageCollection {
    /// All collections in pipeline order, archive last.
    pub const ALL: [StageCollection; 6] = [
        Self::Candidates,
        Self::Approvals,
        Self::Content,
        Self::Releases,
        Self::Published,
        Self::Archives,
    ];

    /// Collection name, also used as the table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidates => "candidates",
            Self::Approvals => "approvals",
            Self::Content => "content",
            Self::Releases => "releases",
            Self::Published => "published",
            Self::Archives => "archives",
        }
    }

    /// Precedence used when an item is found in two collections at once.
    /// Higher wins; human-curated stages outrank the automatic archive.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Candidates => 0,
            Self::Archives => 1,
            Self::Approvals => 2,
            Self::Content => 3,
            Self::Releases => 4,
            Self::Published => 5,
        }
    }
}

impl std::fmt::Display for StageCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageCollection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                format!(
                    "unknown collection '{s}': expected one of candidates, approvals, content, releases, published, archives"
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Item enums
// ---------------------------------------------------------------------------

/// Copyright classification of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyrightStatus {
    PublicDomain,
    Licensed,
    #[default]
    Unknown,
}

impl CopyrightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicDomain => "public_domain",
            Self::Licensed => "licensed",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the stored form; anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "public_domain" => Self::PublicDomain,
            "licensed" => Self::Licensed,
            _ => Self::Unknown,
        }
    }
}

/// Review status carried alongside the collection an item sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    New,
    Pending,
    Approved,
    Rejected,
    Published,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "published" => Self::Published,
            _ => Self::New,
        }
    }
}

// ---------------------------------------------------------------------------
// ContentItem
// ---------------------------------------------------------------------------

/// A unit of content moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Row identifier within its current collection (UUID v7). Empty until stored.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Canonical URL; may be empty.
    #[serde(default)]
    pub link: String,
    pub source_id: String,
    #[serde(default)]
    pub copyright_status: CopyrightStatus,
    #[serde(default)]
    pub attribution: String,
    /// Source-supplied date string, kept verbatim.
    #[serde(default)]
    pub publication_date: String,
    #[serde(default)]
    pub document_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer_id: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// A fresh, unscored item with the required fields set.
    pub fn new(title: impl Into<String>, link: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            body: String::new(),
            link: link.into(),
            source_id: source_id.into(),
            copyright_status: CopyrightStatus::Unknown,
            attribution: String::new(),
            publication_date: String::new(),
            document_number: String::new(),
            score: None,
            reasoning: None,
            scorer_id: None,
            status: ItemStatus::New,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    /// The canonical identity of this item.
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(&self.title, &self.link)
    }
}

// ---------------------------------------------------------------------------
// IdentityKey
// ---------------------------------------------------------------------------

/// Canonical identity of an item: the (title, link) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub title: String,
    pub link: String,
}

impl IdentityKey {
    pub fn new(title: &str, link: &str) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
        }
    }

    /// Stable SHA-256 fingerprint of the pair, for logs and stats.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.link.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' <{}>", self.title, self.link)
    }
}

// ---------------------------------------------------------------------------
// SourceDescriptor
// ---------------------------------------------------------------------------

/// An external source to fetch from. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable source identifier, copied onto every item from this source.
    pub id: String,
    /// Fetch URL.
    pub url: String,
    /// Fetch adapter key; falls back to the workflow's `scraper` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Free-form query parameters.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-source result cap.
    #[serde(default, alias = "maxResults", skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Link template with an `{id}` placeholder, used when a record carries no URL.
    #[serde(default, alias = "linkTemplate", skip_serializing_if = "Option::is_none")]
    pub link_template: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    /// Minimal enabled descriptor.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            adapter: None,
            params: serde_json::Map::new(),
            headers: BTreeMap::new(),
            max_results: None,
            enabled: true,
            link_template: None,
        }
    }

    /// Effective cap given the workflow-wide limit.
    pub fn effective_cap(&self, workflow_max: usize) -> usize {
        self.max_results
            .map(|m| m.min(workflow_max))
            .unwrap_or(workflow_max)
    }
}
