//! Shared types, error model, and configuration for Pressroom.
//!
//! This crate is the foundation depended on by all other Pressroom crates.
//! It provides:
//! - [`PipelineError`] — the unified error type
//! - Domain types ([`ContentItem`], [`StageCollection`], [`SourceDescriptor`])
//! - Workflow records ([`WorkflowConfig`], [`WorkflowExecution`], [`ExecutionSummary`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HttpConfig, OpenRouterConfig, SchedulerConfig, ScoringConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_database_path, validate_api_key,
};
pub use error::{PipelineError, Result};
pub use types::{
    ContentItem, CopyrightStatus, IdentityKey, ItemStatus, SourceDescriptor, StageCollection,
    UNTITLED,
};
pub use workflow::{
    DEFAULT_MAX_RECORDS_PER_SOURCE, DEFAULT_TOP_PER_SOURCE, ExecutionErrorEntry, ExecutionId,
    ExecutionResults, ExecutionStatus, ExecutionSummary, WorkflowConfig, WorkflowExecution,
};
