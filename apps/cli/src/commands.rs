//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use pressroom_core::{
    ExecutionTracker, ProgressReporter, PromotionEngine, Scheduler, TieredExecutionStore,
    WorkflowOrchestrator, reconcile,
};
use pressroom_fetch::{FetchAdapterRegistry, HttpFetcher};
use pressroom_scoring::ScoreAdapterRegistry;
use pressroom_shared::{
    AppConfig, ExecutionId, ExecutionSummary, ItemStatus, StageCollection, WorkflowConfig,
    init_config, load_config, load_config_from, resolve_database_path,
};
use pressroom_storage::{ItemFilter, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Pressroom — intake, score, and curate content from many sources.
#[derive(Parser)]
#[command(
    name = "pressroom",
    version,
    about = "Multi-stage content pipeline: fetch, deduplicate, score, and promote.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.pressroom/pressroom.toml).
    #[arg(long, global = true, env = "PRESSROOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path, overriding `defaults.database_path`.
    #[arg(long, global = true, env = "PRESSROOM_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a workflow over the configured sources (or a workflow file).
    Run {
        /// Workflow JSON file; defaults to `[defaults]` and `[[sources]]` from config.
        #[arg(short, long)]
        workflow: Option<PathBuf>,

        /// Fetch adapter to use.
        #[arg(long)]
        scraper: Option<String>,

        /// Score adapter to use; omit to skip scoring and promotion.
        #[arg(long)]
        scorer: Option<String>,

        /// Per-source intake bound.
        #[arg(long)]
        max_records: Option<usize>,

        /// Items promoted per source.
        #[arg(long)]
        top: Option<usize>,

        /// Collection new items are stored into.
        #[arg(long)]
        target: Option<StageCollection>,

        /// Schedule the run for the worker instead of running it now.
        #[arg(long = "async")]
        run_async: bool,
    },

    /// Show an execution record.
    Status {
        /// Execution ID.
        id: ExecutionId,
    },

    /// Run scheduled executions in the background until interrupted.
    Worker {
        /// Process the current queue once and exit.
        #[arg(long)]
        once: bool,
    },

    /// Cancel a scheduled execution that has not started yet.
    Cancel {
        /// Execution ID.
        id: ExecutionId,
    },

    /// Score existing candidates and promote the best of each source.
    Promote {
        /// Score adapter to use (defaults to `defaults.scorer`).
        #[arg(long)]
        scorer: Option<String>,

        /// Items promoted per source.
        #[arg(long)]
        top: Option<usize>,
    },

    /// List items in a collection.
    List {
        /// Collection to list.
        collection: StageCollection,

        /// Only items from this source.
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of rows.
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Move an item from approvals to content.
    Approve { id: String },

    /// Move an item from approvals to archives.
    Reject {
        id: String,

        /// Recorded rejection reason.
        #[arg(long, default_value = "rejected by reviewer")]
        reason: String,
    },

    /// Move an item from content to releases.
    Release { id: String },

    /// Move an item from releases to published.
    Publish { id: String },

    /// Resolve items present in more than one collection.
    Reconcile,

    /// Delete every item in a collection.
    Truncate {
        collection: StageCollection,

        /// Required to actually delete.
        #[arg(long)]
        yes: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pressroom=info",
        1 => "pressroom=debug",
        _ => "pressroom=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything a command needs, built from the resolved config.
struct App {
    config: AppConfig,
    storage: Arc<Storage>,
}

impl App {
    async fn open(config_path: Option<&Path>, db: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        let db_path = match db {
            Some(path) => path.to_path_buf(),
            None => resolve_database_path(&config)?,
        };
        info!(db = %db_path.display(), "opening database");
        let storage = Arc::new(Storage::open(&db_path).await?);
        Ok(Self { config, storage })
    }

    fn scorers(&self) -> ScoreAdapterRegistry {
        ScoreAdapterRegistry::with_defaults(&self.config)
    }

    fn orchestrator(&self) -> Result<WorkflowOrchestrator> {
        let fetcher = HttpFetcher::new(&self.config.http)?;
        let ttl = Duration::from_secs(self.config.scheduler.execution_ttl_secs);
        let tracker = ExecutionTracker::new(Arc::new(TieredExecutionStore::new(
            self.storage.clone(),
            ttl,
        )));
        Ok(WorkflowOrchestrator::new(
            self.storage.clone(),
            Arc::new(FetchAdapterRegistry::with_defaults(fetcher)),
            Arc::new(self.scorers()),
            tracker,
        )
        .with_timeouts(
            Duration::from_secs(self.config.http.short_timeout_secs),
            Duration::from_secs(self.config.http.long_timeout_secs),
        ))
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let db = cli.db.as_deref();

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
        command => {
            let app = App::open(config_path, db).await?;
            match command {
                Command::Run {
                    workflow,
                    scraper,
                    scorer,
                    max_records,
                    top,
                    target,
                    run_async,
                } => {
                    let mut config = match workflow {
                        Some(path) => read_workflow(&path)?,
                        None => WorkflowConfig::from(&app.config),
                    };
                    if let Some(scraper) = scraper {
                        config.scraper = scraper;
                    }
                    if scorer.is_some() {
                        config.scorer = scorer;
                    }
                    if let Some(max) = max_records {
                        config.max_records_per_source = max;
                    }
                    if let Some(top) = top {
                        config.top_per_source = top;
                    }
                    if let Some(target) = target {
                        config.target_collection = target;
                    }
                    config.run_async |= run_async;
                    cmd_run(&app, config).await
                }
                Command::Status { id } => cmd_status(&app, &id).await,
                Command::Worker { once } => cmd_worker(&app, once).await,
                Command::Cancel { id } => cmd_cancel(&app, &id).await,
                Command::Promote { scorer, top } => cmd_promote(&app, scorer, top).await,
                Command::List {
                    collection,
                    source,
                    limit,
                } => cmd_list(&app, collection, source, limit).await,
                Command::Approve { id } => {
                    cmd_transition(
                        &app,
                        &id,
                        StageCollection::Approvals,
                        StageCollection::Content,
                        ItemStatus::Approved,
                        None,
                    )
                    .await
                }
                Command::Reject { id, reason } => {
                    cmd_transition(
                        &app,
                        &id,
                        StageCollection::Approvals,
                        StageCollection::Archives,
                        ItemStatus::Rejected,
                        Some(&reason),
                    )
                    .await
                }
                Command::Release { id } => {
                    cmd_transition(
                        &app,
                        &id,
                        StageCollection::Content,
                        StageCollection::Releases,
                        ItemStatus::Approved,
                        None,
                    )
                    .await
                }
                Command::Publish { id } => {
                    cmd_transition(
                        &app,
                        &id,
                        StageCollection::Releases,
                        StageCollection::Published,
                        ItemStatus::Published,
                        None,
                    )
                    .await
                }
                Command::Reconcile => cmd_reconcile(&app).await,
                Command::Truncate { collection, yes } => cmd_truncate(&app, collection, yes).await,
                Command::Config { .. } => unreachable!("handled above"),
            }
        }
    }
}

fn read_workflow(path: &Path) -> Result<WorkflowConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read workflow '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid workflow '{}': {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(app: &App, config: WorkflowConfig) -> Result<()> {
    let orchestrator = app.orchestrator()?;

    info!(
        scraper = %config.scraper,
        scorer = config.scorer.as_deref().unwrap_or("none"),
        sources = config.sources.len(),
        target = %config.target_collection,
        "starting workflow"
    );

    let reporter = CliProgress::new();
    let summary = orchestrator.start_with_progress(config, &reporter).await;
    reporter.spinner.finish_and_clear();
    let summary = summary?;

    print_summary(&summary);
    if !summary.success {
        return Err(eyre!(
            "run failed: {}",
            summary.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn print_summary(summary: &ExecutionSummary) {
    println!();
    match &summary.execution_id {
        Some(id) => println!("  Execution: {id}"),
        None => println!("  Execution: (none)"),
    }
    if let Some(status) = summary.status {
        println!("  Status:    {status}");
    }
    println!("  Scraped:   {}", summary.items_scraped);
    println!("  Scored:    {}", summary.items_scored);
    println!("  Stored:    {}", summary.items_stored);
    println!("  Approved:  {}", summary.items_approved);
    println!("  Archived:  {}", summary.items_archived);
    if let Some(error) = &summary.error {
        println!("  Error:     {error}");
    }
    println!();
}

async fn cmd_status(app: &App, id: &ExecutionId) -> Result<()> {
    let orchestrator = app.orchestrator()?;
    let execution = orchestrator
        .get_status(id)
        .await?
        .ok_or_else(|| eyre!("no execution '{id}' (unknown or expired)"))?;
    println!("{}", serde_json::to_string_pretty(&execution)?);
    Ok(())
}

async fn cmd_worker(app: &App, once: bool) -> Result<()> {
    let interval = Duration::from_secs(app.config.scheduler.interval_secs);
    let scheduler = Scheduler::new(Arc::new(app.orchestrator()?), interval);

    if once {
        let ran = scheduler.tick().await?;
        println!("Ran {ran} scheduled execution(s).");
        return Ok(());
    }

    scheduler
        .run_forever(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await;
    Ok(())
}

async fn cmd_cancel(app: &App, id: &ExecutionId) -> Result<()> {
    let interval = Duration::from_secs(app.config.scheduler.interval_secs);
    let scheduler = Scheduler::new(Arc::new(app.orchestrator()?), interval);
    if scheduler.cancel(id).await? {
        println!("Cancelled {id}.");
        Ok(())
    } else {
        Err(eyre!("execution '{id}' is not scheduled (unknown, expired, or already started)"))
    }
}

async fn cmd_promote(app: &App, scorer: Option<String>, top: Option<usize>) -> Result<()> {
    let name = scorer
        .or_else(|| Some(app.config.defaults.scorer.clone()).filter(|s| !s.is_empty()))
        .ok_or_else(|| eyre!("no scorer given and defaults.scorer is empty"))?;
    let top = top.unwrap_or(app.config.defaults.top_per_source);

    let scorer = app.scorers().load(&name)?;
    let engine = PromotionEngine::new(app.storage.clone(), scorer)
        .with_score_timeout(Duration::from_secs(app.config.http.long_timeout_secs));
    let outcome = engine.run_promotion_pass(top).await?;

    println!();
    println!("  Scored:    {}", outcome.scored);
    println!("  Approved:  {}", outcome.approved);
    println!("  Archived:  {}", outcome.archived);
    if outcome.failed_moves > 0 {
        println!("  Failed:    {} (left in candidates)", outcome.failed_moves);
    }
    if !outcome.fallback_sources.is_empty() {
        println!("  Fallback:  {}", outcome.fallback_sources.join(", "));
    }
    println!();
    Ok(())
}

async fn cmd_list(
    app: &App,
    collection: StageCollection,
    source: Option<String>,
    limit: usize,
) -> Result<()> {
    let filter = ItemFilter {
        source_id: source,
        limit: Some(limit),
        ..ItemFilter::default()
    };
    let items = app.storage.query_items(collection, &filter).await?;

    if items.is_empty() {
        println!("No items in {collection}.");
        return Ok(());
    }
    for item in &items {
        let score = item
            .score
            .map(|s| format!("{s:>5.1}"))
            .unwrap_or_else(|| "    -".into());
        println!(
            "{}  {score}  {:<10}  {:<16}  {}",
            item.id,
            item.status.as_str(),
            item.source_id,
            item.title
        );
    }
    println!("\n{} item(s) in {collection}", items.len());
    Ok(())
}

async fn cmd_transition(
    app: &App,
    id: &str,
    from: StageCollection,
    to: StageCollection,
    status: ItemStatus,
    reason: Option<&str>,
) -> Result<()> {
    let outcome = app
        .storage
        .transition_item(from, to, id, status, reason)
        .await?
        .ok_or_else(|| eyre!("no item '{id}' in {from}"))?;

    if outcome.already_present {
        println!("Already in {to} as {}.", outcome.destination_id);
    } else {
        println!("Moved to {to} as {}.", outcome.destination_id);
    }
    if !outcome.source_removed {
        println!("Warning: copy left in {from}; run `pressroom reconcile`.");
    }
    Ok(())
}

async fn cmd_reconcile(app: &App) -> Result<()> {
    let report = reconcile::sweep(&app.storage).await?;
    println!(
        "Conflicts: {}  Removed: {}  Failed: {}",
        report.conflicts, report.removed, report.failed
    );
    Ok(())
}

async fn cmd_truncate(app: &App, collection: StageCollection, yes: bool) -> Result<()> {
    if !yes {
        let count = app.storage.count_items(collection).await?;
        return Err(eyre!(
            "refusing to delete {count} item(s) from {collection} without --yes"
        ));
    }
    let removed = app.storage.truncate(collection).await?;
    println!("Deleted {removed} item(s) from {collection}.");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str, percent: u8) {
        self.spinner.set_message(format!("[{percent:>3}%] {name}"));
    }

    fn source_done(&self, source_id: &str, fetched: usize, current: usize, total: usize) {
        self.spinner
            .println(format!("  [{current}/{total}] {source_id}: {fetched} record(s)"));
    }

    fn done(&self, _summary: &ExecutionSummary) {
        self.spinner.finish_and_clear();
    }
}
