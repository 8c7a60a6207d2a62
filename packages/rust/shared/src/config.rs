//! Application configuration for Pressroom.
//!
//! User config lives at `~/.pressroom/pressroom.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{SourceDescriptor, StageCollection};
use crate::workflow::{DEFAULT_MAX_RECORDS_PER_SOURCE, DEFAULT_TOP_PER_SOURCE, WorkflowConfig};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pressroom.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pressroom";

// ---------------------------------------------------------------------------
// Config structs (matching pressroom.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// OpenRouter settings for the LLM scorer.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Keyword scorer rubric.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Background scheduler and execution retention.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Configured sources.
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file path. A leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Default fetch adapter key.
    #[serde(default = "default_scraper")]
    pub scraper: String,

    /// Default score adapter key (empty disables scoring).
    #[serde(default)]
    pub scorer: String,

    #[serde(default = "default_max_records")]
    pub max_records_per_source: usize,

    #[serde(default = "default_top_per_source")]
    pub top_per_source: usize,

    #[serde(default)]
    pub target_collection: StageCollection,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scraper: default_scraper(),
            scorer: String::new(),
            max_records_per_source: default_max_records(),
            top_per_source: default_top_per_source(),
            target_collection: StageCollection::Candidates,
        }
    }
}

fn default_database_path() -> String {
    "~/.pressroom/pressroom.db".into()
}
fn default_scraper() -> String {
    "json_api".into()
}
fn default_max_records() -> usize {
    DEFAULT_MAX_RECORDS_PER_SOURCE
}
fn default_top_per_source() -> usize {
    DEFAULT_TOP_PER_SOURCE
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for fetches and metadata calls.
    #[serde(default = "default_short_timeout")]
    pub short_timeout_secs: u64,

    /// Timeout for batch scoring and other long calls.
    #[serde(default = "default_long_timeout")]
    pub long_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            short_timeout_secs: default_short_timeout(),
            long_timeout_secs: default_long_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_short_timeout() -> u64 {
    30
}
fn default_long_timeout() -> u64 {
    120
}
fn default_user_agent() -> String {
    concat!("Pressroom/", env!("CARGO_PKG_VERSION")).into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for batch scoring.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}

/// `[scoring]` section: rubric for the keyword scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Score every item starts from.
    #[serde(default = "default_baseline")]
    pub baseline: f64,

    /// Keyword → weight added per occurrence (title counts double).
    #[serde(default)]
    pub keywords: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            keywords: BTreeMap::new(),
        }
    }
}

fn default_baseline() -> f64 {
    10.0
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// How long execution records stay pollable.
    #[serde(default = "default_execution_ttl")]
    pub execution_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            execution_ttl_secs: default_execution_ttl(),
        }
    }
}

fn default_interval() -> u64 {
    60
}
fn default_execution_ttl() -> u64 {
    3600
}

// ---------------------------------------------------------------------------
// Workflow config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

impl From<&AppConfig> for WorkflowConfig {
    fn from(config: &AppConfig) -> Self {
        let scorer = Some(config.defaults.scorer.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            scraper: config.defaults.scraper.clone(),
            scorer,
            max_records_per_source: config.defaults.max_records_per_source,
            top_per_source: config.defaults.top_per_source,
            target_collection: config.defaults.target_collection,
            sources: config.sources.clone(),
            run_async: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pressroom/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pressroom/pressroom.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PipelineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve `defaults.database_path`, expanding a leading `~/`.
pub fn resolve_database_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.defaults.database_path.as_str();
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &OpenRouterConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PipelineError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
