//! End-to-end run: sources → fetch → normalize → dedup → store → score → promote.
//!
//! Control flow within a run is strictly sequential, one source after another.
//! A failing source is recorded and skipped; only an adapter that cannot be
//! loaded fails the run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use url::Url;

use pressroom_fetch::{FetchAdapter, FetchAdapterRegistry, FetchRequest, normalize};
use pressroom_scoring::{ScoreAdapter, ScoreAdapterRegistry};
use pressroom_shared::{
    ContentItem, ExecutionErrorEntry, ExecutionId, ExecutionStatus, ExecutionSummary, ItemStatus,
    PipelineError, Result, StageCollection, WorkflowConfig, WorkflowExecution,
};
use pressroom_storage::Storage;

use crate::dedup::{DedupGate, DedupVerdict};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::promotion::{DEFAULT_SCORE_TIMEOUT, PromotionEngine, score_with_fallback};
use crate::tracker::{ExecutionPatch, ExecutionTracker};

/// Default bound on one source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// Progress checkpoints.
const PROGRESS_ADAPTERS: u8 = 5;
const PROGRESS_SCRAPE_START: u8 = 10;
const PROGRESS_SCRAPE_SPAN: usize = 50;
const PROGRESS_SCORING: u8 = 65;
const PROGRESS_STORING: u8 = 80;
const PROGRESS_PIPELINE: u8 = 90;
const PROGRESS_DONE: u8 = 100;

/// Adapters resolved for one run.
struct LoadedAdapters {
    fetchers: BTreeMap<String, Arc<dyn FetchAdapter>>,
    scorer: Option<Arc<dyn ScoreAdapter>>,
}

pub struct WorkflowOrchestrator {
    storage: Arc<Storage>,
    fetchers: Arc<FetchAdapterRegistry>,
    scorers: Arc<ScoreAdapterRegistry>,
    tracker: ExecutionTracker,
    fetch_timeout: Duration,
    score_timeout: Duration,
}

impl WorkflowOrchestrator {
    pub fn new(
        storage: Arc<Storage>,
        fetchers: Arc<FetchAdapterRegistry>,
        scorers: Arc<ScoreAdapterRegistry>,
        tracker: ExecutionTracker,
    ) -> Self {
        Self {
            storage,
            fetchers,
            scorers,
            tracker,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            score_timeout: DEFAULT_SCORE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, fetch: Duration, score: Duration) -> Self {
        self.fetch_timeout = fetch;
        self.score_timeout = score;
        self
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Reject a config that cannot run. No record is created and nothing is fetched.
    pub fn validate(&self, config: &WorkflowConfig) -> Result<()> {
        if config.scraper.trim().is_empty() {
            return Err(PipelineError::validation("scraper is required"));
        }
        if !self.fetchers.contains(&config.scraper) {
            return Err(PipelineError::validation(format!(
                "unknown scraper '{}' (available: {})",
                config.scraper,
                self.fetchers.names().join(", ")
            )));
        }
        if let Some(scorer) = &config.scorer {
            if !self.scorers.contains(scorer) {
                return Err(PipelineError::validation(format!(
                    "unknown scorer '{scorer}' (available: {})",
                    self.scorers.names().join(", ")
                )));
            }
        }
        if config.sources.is_empty() {
            return Err(PipelineError::validation("sources must not be empty"));
        }
        if config.max_records_per_source == 0 {
            return Err(PipelineError::validation(
                "maxRecordsPerSource must be at least 1",
            ));
        }
        for source in &config.sources {
            if source.id.trim().is_empty() {
                return Err(PipelineError::validation("every source needs an id"));
            }
            Url::parse(&source.url).map_err(|e| {
                PipelineError::validation(format!(
                    "source '{}' has an invalid url '{}': {e}",
                    source.id, source.url
                ))
            })?;
            if let Some(adapter) = &source.adapter {
                if !self.fetchers.contains(adapter) {
                    return Err(PipelineError::validation(format!(
                        "source '{}' names unknown adapter '{adapter}'",
                        source.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and run `config`, or schedule it when `async` is set.
    pub async fn start(&self, config: WorkflowConfig) -> Result<ExecutionSummary> {
        self.start_with_progress(config, &SilentProgress).await
    }

    pub async fn start_with_progress(
        &self,
        config: WorkflowConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<ExecutionSummary> {
        self.validate(&config)?;

        let execution = WorkflowExecution::new(config);
        self.tracker.save(&execution).await?;

        if execution.status == ExecutionStatus::Scheduled {
            info!(execution_id = %execution.id, "execution scheduled");
            return Ok(ExecutionSummary::from_execution(&execution));
        }

        let finished = self.run_execution(execution, progress).await;
        let summary = ExecutionSummary::from_execution(&finished);
        progress.done(&summary);
        Ok(summary)
    }

    pub async fn get_status(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        self.tracker.get(id).await
    }

    /// Drive `execution` to a terminal state and return the final record.
    #[instrument(skip_all, fields(execution_id = %execution.id, scraper = %execution.config.scraper))]
    pub async fn run_execution(
        &self,
        mut execution: WorkflowExecution,
        progress: &dyn ProgressReporter,
    ) -> WorkflowExecution {
        self.checkpoint(
            &mut execution,
            ExecutionPatch::stage("Loading adapters", PROGRESS_ADAPTERS)
                .with_status(ExecutionStatus::Running),
        )
        .await;
        progress.phase("Loading adapters", PROGRESS_ADAPTERS);

        let adapters = match self.load_adapters(&execution.config) {
            Ok(adapters) => adapters,
            Err(e) => {
                warn!(error = %e, "adapter load failed");
                let reached = execution.progress;
                self.checkpoint(
                    &mut execution,
                    ExecutionPatch::stage("Failed", reached)
                        .with_status(ExecutionStatus::Failed)
                        .with_error(ExecutionErrorEntry::new(e.to_string(), None)),
                )
                .await;
                return execution;
            }
        };

        // Per-source items turned away as duplicates, for promotion stats.
        let mut duplicates = HashMap::new();
        let mut batch = self
            .scrape(&mut execution, &adapters, &mut duplicates, progress)
            .await;
        let target = execution.config.target_collection;

        // Non-intake targets are scored inline at the Scoring checkpoint. Intake
        // is scored after storing, inside the "Scoring and promotion" phase.
        if target != StageCollection::Candidates {
            if let Some(scorer) = &adapters.scorer {
                self.checkpoint(&mut execution, ExecutionPatch::stage("Scoring", PROGRESS_SCORING))
                    .await;
                progress.phase("Scoring", PROGRESS_SCORING);
                for group in batch.iter_mut() {
                    let fallback =
                        score_with_fallback(scorer.as_ref(), group, self.score_timeout).await;
                    if fallback {
                        let source_id = group.first().map(|i| i.source_id.as_str());
                        execution.errors.push(ExecutionErrorEntry::new(
                            "scorer failed; fallback ranking applied",
                            source_id,
                        ));
                    }
                    execution.results.items_scored += group.len();
                }
            }
        }

        let results = execution.results.clone();
        self.checkpoint(
            &mut execution,
            ExecutionPatch::stage(format!("Storing into {target}"), PROGRESS_STORING)
                .with_results(&results),
        )
        .await;
        progress.phase("Storing", PROGRESS_STORING);
        self.store_batch(&mut execution, batch, target, &mut duplicates)
            .await;

        if target == StageCollection::Candidates {
            if let Some(scorer) = &adapters.scorer {
                let results = execution.results.clone();
                self.checkpoint(
                    &mut execution,
                    ExecutionPatch::stage("Scoring and promotion", PROGRESS_PIPELINE)
                        .with_results(&results),
                )
                .await;
                progress.phase("Scoring and promotion", PROGRESS_PIPELINE);
                self.promote(&mut execution, scorer.clone(), duplicates)
                    .await;
            }
        }

        let results = execution.results.clone();
        self.checkpoint(
            &mut execution,
            ExecutionPatch::stage("Complete", PROGRESS_DONE)
                .with_status(ExecutionStatus::Completed)
                .with_results(&results),
        )
        .await;
        progress.phase("Complete", PROGRESS_DONE);

        info!(
            scraped = execution.results.items_scraped,
            stored = execution.results.items_stored,
            duplicates = execution.results.items_duplicate,
            approved = execution.results.items_approved,
            archived = execution.results.items_archived,
            sources_failed = execution.results.sources_failed,
            "execution complete"
        );
        execution
    }

    fn load_adapters(&self, config: &WorkflowConfig) -> Result<LoadedAdapters> {
        let mut fetchers = BTreeMap::new();
        let names = std::iter::once(config.scraper.as_str())
            .chain(config.enabled_sources().filter_map(|s| s.adapter.as_deref()));
        for name in names {
            if !fetchers.contains_key(name) {
                fetchers.insert(name.to_string(), self.fetchers.load(name)?);
            }
        }
        let scorer = match &config.scorer {
            Some(name) => Some(self.scorers.load(name)?),
            None => None,
        };
        Ok(LoadedAdapters { fetchers, scorer })
    }

    /// Fetch, normalize and dedup every enabled source. Returns admitted items
    /// grouped by source, in scrape order.
    async fn scrape(
        &self,
        execution: &mut WorkflowExecution,
        adapters: &LoadedAdapters,
        duplicates: &mut HashMap<String, usize>,
        progress: &dyn ProgressReporter,
    ) -> Vec<Vec<ContentItem>> {
        let config = execution.config.clone();
        let sources: Vec<_> = config.enabled_sources().collect();
        let total = sources.len();
        let mut gate = DedupGate::new(&self.storage);
        let mut batch = Vec::new();

        for (i, source) in sources.into_iter().enumerate() {
            let percent = PROGRESS_SCRAPE_START + (PROGRESS_SCRAPE_SPAN * i / total.max(1)) as u8;
            let stage = format!("Scraping {} ({}/{total})", source.id, i + 1);
            let results = execution.results.clone();
            self.checkpoint(execution, ExecutionPatch::stage(&stage, percent).with_results(&results))
                .await;
            progress.phase(&stage, percent);

            let adapter_name = source.adapter.as_deref().unwrap_or(&config.scraper);
            let Some(adapter) = adapters.fetchers.get(adapter_name) else {
                continue;
            };
            let cap = source.effective_cap(config.max_records_per_source);
            let request = FetchRequest::new(source.clone(), cap, self.fetch_timeout);

            let records = match tokio::time::timeout(self.fetch_timeout, adapter.fetch(&request)).await {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => {
                    self.source_failed(execution, &source.id, PipelineError::from(e));
                    progress.source_done(&source.id, 0, i + 1, total);
                    continue;
                }
                Err(_) => {
                    let e = PipelineError::Timeout(format!(
                        "source '{}' exceeded {:?}",
                        source.id, self.fetch_timeout
                    ));
                    self.source_failed(execution, &source.id, e);
                    progress.source_done(&source.id, 0, i + 1, total);
                    continue;
                }
            };

            let mut admitted = Vec::new();
            let fetched = records.len().min(cap);
            for raw in records.iter().take(cap) {
                let item = normalize(raw, source);
                execution.results.items_scraped += 1;
                match gate.check(&item).await {
                    Ok(DedupVerdict::New) => admitted.push(item),
                    Ok(_) => {
                        execution.results.items_duplicate += 1;
                        *duplicates.entry(source.id.clone()).or_default() += 1;
                    }
                    Err(e) => {
                        warn!(source_id = %source.id, error = %e, "dedup check failed; item skipped");
                        execution
                            .errors
                            .push(ExecutionErrorEntry::new(e.to_string(), Some(&source.id)));
                    }
                }
            }

            info!(source_id = %source.id, fetched, admitted = admitted.len(), "source processed");
            execution.results.sources_processed += 1;
            progress.source_done(&source.id, fetched, i + 1, total);
            if !admitted.is_empty() {
                batch.push(admitted);
            }
        }

        batch
    }

    fn source_failed(&self, execution: &mut WorkflowExecution, source_id: &str, error: PipelineError) {
        warn!(source_id, error = %error, "source failed; continuing");
        execution.results.sources_failed += 1;
        execution
            .errors
            .push(ExecutionErrorEntry::new(error.to_string(), Some(source_id)));
    }

    /// Insert admitted items into `target`. A unique-constraint rejection is a
    /// skip; other failures are recorded and the item dropped.
    async fn store_batch(
        &self,
        execution: &mut WorkflowExecution,
        batch: Vec<Vec<ContentItem>>,
        target: StageCollection,
        duplicates: &mut HashMap<String, usize>,
    ) {
        let status = initial_status(target);
        for mut item in batch.into_iter().flatten() {
            item.status = status;
            match self.storage.insert_item(target, &item).await {
                Ok(_) => execution.results.items_stored += 1,
                Err(e) if e.is_constraint() => {
                    execution.results.items_duplicate += 1;
                    *duplicates.entry(item.source_id.clone()).or_default() += 1;
                }
                Err(e) => {
                    warn!(source_id = %item.source_id, error = %e, "insert failed");
                    execution
                        .errors
                        .push(ExecutionErrorEntry::new(e.to_string(), Some(&item.source_id)));
                }
            }
        }
    }

    async fn promote(
        &self,
        execution: &mut WorkflowExecution,
        scorer: Arc<dyn ScoreAdapter>,
        duplicates: HashMap<String, usize>,
    ) {
        let engine = PromotionEngine::new(self.storage.clone(), scorer)
            .with_score_timeout(self.score_timeout)
            .with_intake_duplicates(duplicates);
        match engine
            .run_promotion_pass(execution.config.top_per_source)
            .await
        {
            Ok(outcome) => {
                execution.results.items_scored += outcome.scored;
                execution.results.items_approved += outcome.approved;
                execution.results.items_archived += outcome.archived;
                for source_id in &outcome.fallback_sources {
                    execution.errors.push(ExecutionErrorEntry::new(
                        "scorer failed; fallback ranking applied",
                        Some(source_id),
                    ));
                }
            }
            Err(e) => {
                warn!(error = %e, "promotion pass failed; candidates left in place");
                execution
                    .errors
                    .push(ExecutionErrorEntry::new(e.to_string(), None));
            }
        }
    }

    /// Apply `patch` locally and persist the record. Tracker failures are
    /// logged; the run continues on its local copy.
    async fn checkpoint(&self, execution: &mut WorkflowExecution, patch: ExecutionPatch) {
        patch.apply_to(execution);
        if let Err(e) = self.tracker.save(execution).await {
            warn!(execution_id = %execution.id, error = %e, "failed to persist execution record");
        }
    }
}

/// Status an item carries when first stored into `collection`.
fn initial_status(collection: StageCollection) -> ItemStatus {
    match collection {
        StageCollection::Candidates => ItemStatus::New,
        StageCollection::Approvals => ItemStatus::Pending,
        StageCollection::Content | StageCollection::Releases => ItemStatus::Approved,
        StageCollection::Published => ItemStatus::Published,
        StageCollection::Archives => ItemStatus::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pressroom_fetch::FetchError;
    use pressroom_scoring::{KeywordScorer, ScoredItem, ScoringError};
    use pressroom_shared::SourceDescriptor;
    use serde_json::{Value, json};
    use uuid::Uuid;

    struct StaticFetcher;

    #[async_trait]
    impl FetchAdapter for StaticFetcher {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Vec<Value>, FetchError> {
            let id = &request.source.id;
            Ok((0..3)
                .map(|i| json!({"title": format!("{id} item {i}"), "url": format!("https://{id}.example/{i}")}))
                .collect())
        }
    }

    struct UnreachableScorer;

    #[async_trait]
    impl ScoreAdapter for UnreachableScorer {
        fn name(&self) -> &str {
            "down"
        }

        async fn score_batch(
            &self,
            _items: &[ContentItem],
        ) -> std::result::Result<Vec<ScoredItem>, ScoringError> {
            Err(ScoringError::Timeout(1))
        }
    }

    async fn orchestrator() -> WorkflowOrchestrator {
        let tmp = std::env::temp_dir().join(format!("pressroom_orch_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));

        let mut fetchers = FetchAdapterRegistry::empty();
        fetchers.register(Arc::new(StaticFetcher));

        let mut scorers = ScoreAdapterRegistry::empty();
        scorers.register(Arc::new(KeywordScorer::new(10.0, [("item 2".to_string(), 20.0)])));
        scorers.register(Arc::new(UnreachableScorer));
        scorers.register_factory("needs_key", || Err("API key missing".to_string()));

        WorkflowOrchestrator::new(
            storage,
            Arc::new(fetchers),
            Arc::new(scorers),
            ExecutionTracker::in_memory(),
        )
    }

    fn workflow(sources: &[&str]) -> WorkflowConfig {
        WorkflowConfig::new(
            "static",
            sources
                .iter()
                .map(|id| SourceDescriptor::new(*id, format!("https://{id}.example/feed")))
                .collect(),
        )
    }

    #[tokio::test]
    async fn validation_rejects_bad_configs() {
        let orch = orchestrator().await;

        let mut config = workflow(&[]);
        assert!(matches!(orch.validate(&config), Err(PipelineError::Validation { .. })));

        config = workflow(&["a"]);
        config.scraper = "nope".into();
        let err = orch.validate(&config).unwrap_err();
        assert!(err.to_string().contains("unknown scraper 'nope'"));

        config = workflow(&["a"]);
        config.scorer = Some("nope".into());
        assert!(orch.validate(&config).is_err());

        config = workflow(&["a"]);
        config.max_records_per_source = 0;
        assert!(orch.validate(&config).is_err());

        config = workflow(&["a"]);
        config.sources[0].url = "not a url".into();
        let err = orch.validate(&config).unwrap_err();
        assert!(err.to_string().contains("invalid url"));

        config = workflow(&["a"]);
        config.sources[0].adapter = Some("missing".into());
        assert!(orch.validate(&config).is_err());

        assert!(orch.validate(&workflow(&["a", "b"])).is_ok());
    }

    #[tokio::test]
    async fn invalid_config_creates_no_record() {
        let orch = orchestrator().await;
        let err = orch.start(workflow(&[])).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
        assert!(orch
            .tracker()
            .list(ExecutionStatus::Running)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn scorer_load_failure_fails_the_run() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.scorer = Some("needs_key".into());

        let summary = orch.start(config).await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.status, Some(ExecutionStatus::Failed));
        assert!(summary.error.unwrap().contains("API key missing"));
        assert_eq!(summary.items_scraped, 0);

        let record = orch
            .get_status(&summary.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.progress, PROGRESS_ADAPTERS);
    }

    #[tokio::test]
    async fn intake_without_scorer_stores_candidates() {
        let orch = orchestrator().await;
        let summary = orch.start(workflow(&["a", "b"])).await.unwrap();

        assert!(summary.success);
        assert_eq!(summary.items_scraped, 6);
        assert_eq!(summary.items_stored, 6);
        assert_eq!(summary.items_scored, 0);
        assert_eq!(
            orch.storage()
                .count_items(StageCollection::Candidates)
                .await
                .unwrap(),
            6
        );

        let record = orch
            .get_status(&summary.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.stage, "Complete");
        assert_eq!(record.results.sources_processed, 2);
    }

    #[tokio::test]
    async fn cap_limits_records_per_source() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.max_records_per_source = 2;
        let summary = orch.start(config).await.unwrap();
        assert_eq!(summary.items_scraped, 2);
        assert_eq!(summary.items_stored, 2);
    }

    #[tokio::test]
    async fn non_intake_target_is_scored_inline() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.scorer = Some("keyword".into());
        config.target_collection = StageCollection::Approvals;

        let summary = orch.start(config).await.unwrap();
        assert_eq!(summary.items_scored, 3);
        assert_eq!(summary.items_stored, 3);

        let approvals = orch
            .storage()
            .query_items(StageCollection::Approvals, &Default::default())
            .await
            .unwrap();
        assert_eq!(approvals.len(), 3);
        assert!(approvals.iter().all(|i| i.status == ItemStatus::Pending));
        assert!(approvals.iter().all(|i| i.scorer_id.as_deref() == Some("keyword")));
        assert_eq!(
            orch.storage()
                .count_items(StageCollection::Candidates)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn inline_scorer_failure_falls_back_and_records_error() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.scorer = Some("down".into());
        config.target_collection = StageCollection::Content;

        let summary = orch.start(config).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.items_stored, 3);

        let record = orch
            .get_status(&summary.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].source_id.as_deref(), Some("a"));

        let stored = orch
            .storage()
            .query_items(StageCollection::Content, &Default::default())
            .await
            .unwrap();
        let mut scores: Vec<f64> = stored.iter().filter_map(|i| i.score).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
    }

    #[derive(Default)]
    struct RecordingProgress(std::sync::Mutex<Vec<(String, u8)>>);

    impl RecordingProgress {
        fn percents(&self) -> Vec<u8> {
            self.0.lock().unwrap().iter().map(|(_, p)| *p).collect()
        }
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str, percent: u8) {
            self.0.lock().unwrap().push((name.to_string(), percent));
        }
        fn source_done(&self, _source_id: &str, _fetched: usize, _current: usize, _total: usize) {}
        fn done(&self, _summary: &ExecutionSummary) {}
    }

    #[tokio::test]
    async fn intake_scores_inside_promotion_phase() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.scorer = Some("keyword".into());

        let progress = RecordingProgress::default();
        orch.start_with_progress(config, &progress).await.unwrap();
        assert_eq!(
            progress.percents(),
            [PROGRESS_ADAPTERS, PROGRESS_SCRAPE_START, PROGRESS_STORING, PROGRESS_PIPELINE, PROGRESS_DONE]
        );
    }

    #[tokio::test]
    async fn inline_scoring_reports_scoring_before_storing() {
        let orch = orchestrator().await;
        let mut config = workflow(&["a"]);
        config.scorer = Some("keyword".into());
        config.target_collection = StageCollection::Approvals;

        let progress = RecordingProgress::default();
        orch.start_with_progress(config, &progress).await.unwrap();
        assert_eq!(
            progress.percents(),
            [PROGRESS_ADAPTERS, PROGRESS_SCRAPE_START, PROGRESS_SCORING, PROGRESS_STORING, PROGRESS_DONE]
        );
    }

    #[tokio::test]
    async fn intake_dedup_skips_feed_source_stats() {
        let orch = orchestrator().await;
        // The repeated descriptor yields the same three records again.
        let mut config = workflow(&["a", "a", "b"]);
        config.scorer = Some("keyword".into());
        config.top_per_source = 1;

        let summary = orch.start(config).await.unwrap();
        assert_eq!(summary.items_stored, 6);

        let stats = orch.storage().list_source_stats(10).await.unwrap();
        let a = stats.iter().find(|s| s.source_id == "a").expect("stats for a");
        assert_eq!(a.item_count, 3);
        assert_eq!(a.duplicate_count, 3);
        let b = stats.iter().find(|s| s.source_id == "b").expect("stats for b");
        assert_eq!(b.duplicate_count, 0);
    }
}
