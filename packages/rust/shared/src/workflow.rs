//! Workflow configuration and execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::{SourceDescriptor, StageCollection};

/// Default per-source intake bound.
pub const DEFAULT_MAX_RECORDS_PER_SOURCE: usize = 10;

/// Default number of items promoted per source.
pub const DEFAULT_TOP_PER_SOURCE: usize = 2;

// ---------------------------------------------------------------------------
// ExecutionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for execution identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

/// Input to a single orchestration. Field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Fetch adapter key.
    #[serde(default)]
    pub scraper: String,
    /// Score adapter key; no scoring or promotion when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer: Option<String>,
    #[serde(default = "default_max_records")]
    pub max_records_per_source: usize,
    #[serde(default = "default_top_per_source")]
    pub top_per_source: usize,
    #[serde(default)]
    pub target_collection: StageCollection,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    /// Defer the run to the background scheduler.
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS_PER_SOURCE
}

fn default_top_per_source() -> usize {
    DEFAULT_TOP_PER_SOURCE
}

impl WorkflowConfig {
    /// A synchronous workflow over `sources` with default limits.
    pub fn new(scraper: impl Into<String>, sources: Vec<SourceDescriptor>) -> Self {
        Self {
            scraper: scraper.into(),
            scorer: None,
            max_records_per_source: DEFAULT_MAX_RECORDS_PER_SOURCE,
            top_per_source: DEFAULT_TOP_PER_SOURCE,
            target_collection: StageCollection::Candidates,
            sources,
            run_async: false,
        }
    }

    /// Sources that will actually be fetched.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Scheduled,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated counts for an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResults {
    pub items_scraped: usize,
    pub items_scored: usize,
    pub items_stored: usize,
    pub items_duplicate: usize,
    pub items_approved: usize,
    pub items_archived: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
}

/// One recorded, non-fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorEntry {
    pub message: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl ExecutionErrorEntry {
    pub fn new(message: impl Into<String>, source_id: Option<&str>) -> Self {
        Self {
            message: message.into(),
            time: Utc::now(),
            source_id: source_id.map(str::to_string),
        }
    }
}

/// Mutable state of a running or finished orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    /// Free-text description of the current phase.
    pub stage: String,
    /// 0–100, never decreases within a run.
    pub progress: u8,
    pub config: WorkflowConfig,
    pub results: ExecutionResults,
    pub errors: Vec<ExecutionErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// A new record in `running` or `scheduled` state.
    pub fn new(config: WorkflowConfig) -> Self {
        let now = Utc::now();
        let (status, stage) = if config.run_async {
            (ExecutionStatus::Scheduled, "Scheduled")
        } else {
            (ExecutionStatus::Running, "Starting")
        };
        Self {
            id: ExecutionId::new(),
            status,
            stage: stage.into(),
            progress: 0,
            config,
            results: ExecutionResults::default(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionSummary
// ---------------------------------------------------------------------------

/// What a caller of `start` receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    pub items_scraped: usize,
    pub items_scored: usize,
    pub items_stored: usize,
    pub items_approved: usize,
    pub items_archived: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSummary {
    /// Summary of an execution record; failed runs carry their last error.
    pub fn from_execution(execution: &WorkflowExecution) -> Self {
        let failed = execution.status == ExecutionStatus::Failed;
        Self {
            success: !failed,
            execution_id: Some(execution.id.clone()),
            status: Some(execution.status),
            items_scraped: execution.results.items_scraped,
            items_scored: execution.results.items_scored,
            items_stored: execution.results.items_stored,
            items_approved: execution.results.items_approved,
            items_archived: execution.results.items_archived,
            error: if failed {
                execution.errors.last().map(|e| e.message.clone())
            } else {
                None
            },
        }
    }

    /// `{success: false, error}` for a call that never produced an execution.
    pub fn failure(err: &PipelineError) -> Self {
        Self {
            success: false,
            execution_id: None,
            status: None,
            items_scraped: 0,
            items_scored: 0,
            items_stored: 0,
            items_approved: 0,
            items_archived: 0,
            error: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_roundtrip() {
        let id = ExecutionId::new();
        let parsed: ExecutionId = id.to_string().parse().expect("parse ExecutionId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn workflow_config_defaults_from_wire() {
        let json = r#"{"scraper":"json_api","sources":[{"id":"a","url":"https://a.example"}]}"#;
        let config: WorkflowConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.max_records_per_source, 10);
        assert_eq!(config.top_per_source, 2);
        assert_eq!(config.target_collection, StageCollection::Candidates);
        assert!(!config.run_async);
        assert!(config.scorer.is_none());
    }

    #[test]
    fn workflow_config_reads_camel_case_and_async() {
        let json = r#"{
            "scraper": "rss",
            "scorer": "keyword",
            "maxRecordsPerSource": 5,
            "topPerSource": 1,
            "targetCollection": "approvals",
            "async": true,
            "sources": []
        }"#;
        let config: WorkflowConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.max_records_per_source, 5);
        assert_eq!(config.top_per_source, 1);
        assert_eq!(config.target_collection, StageCollection::Approvals);
        assert!(config.run_async);

        let back = serde_json::to_value(&config).expect("serialize");
        assert_eq!(back["async"], serde_json::Value::Bool(true));
    }

    #[test]
    fn new_execution_status_follows_async_flag() {
        let mut config = WorkflowConfig::new("json_api", vec![]);
        assert_eq!(WorkflowExecution::new(config.clone()).status, ExecutionStatus::Running);
        config.run_async = true;
        assert_eq!(WorkflowExecution::new(config).status, ExecutionStatus::Scheduled);
    }

    #[test]
    fn failure_summary_carries_message() {
        let summary = ExecutionSummary::failure(&PipelineError::validation("no sources"));
        assert!(!summary.success);
        assert!(summary.execution_id.is_none());
        assert!(summary.error.unwrap().contains("no sources"));
    }
}
