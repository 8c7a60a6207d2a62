//! Scoring and stage promotion of intake candidates.
//!
//! Candidates are grouped by source and scored one batch per source. Each
//! group is ranked by score; the top K move to `approvals` and the rest to
//! `archives`. A scorer failure falls back to scrape order so the pipeline
//! keeps moving.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use pressroom_scoring::{ScoreAdapter, apply_scores};
use pressroom_shared::{ContentItem, ItemStatus, Result, StageCollection};
use pressroom_storage::{ItemFilter, SourceStats, Storage};

/// Reasoning recorded on items ranked without a scorer.
pub const FALLBACK_REASONING: &str = "fallback: scorer unavailable";

/// Scorer id recorded on fallback-ranked items.
pub const FALLBACK_SCORER_ID: &str = "fallback";

/// Rejection reason for candidates that missed the cut.
pub const LOW_SCORE_REASON: &str = "low_score";

/// Default bound on one batch scoring call.
pub const DEFAULT_SCORE_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one promotion pass.
#[derive(Debug, Clone, Default)]
pub struct PromotionOutcome {
    pub scored: usize,
    pub approved: usize,
    pub archived: usize,
    /// Moves that failed; those candidates stay in `candidates`.
    pub failed_moves: usize,
    /// Sources ranked by fallback.
    pub fallback_sources: Vec<String>,
    pub stats: Vec<SourceStats>,
}

pub struct PromotionEngine {
    storage: Arc<Storage>,
    scorer: Arc<dyn ScoreAdapter>,
    score_timeout: Duration,
    /// Items the dedup gate rejected at intake, per source.
    intake_duplicates: HashMap<String, usize>,
}

impl PromotionEngine {
    pub fn new(storage: Arc<Storage>, scorer: Arc<dyn ScoreAdapter>) -> Self {
        Self {
            storage,
            scorer,
            score_timeout: DEFAULT_SCORE_TIMEOUT,
            intake_duplicates: HashMap::new(),
        }
    }

    pub fn with_score_timeout(mut self, timeout: Duration) -> Self {
        self.score_timeout = timeout;
        self
    }

    /// Fold intake dedup rejections into each source's `duplicate_count`.
    pub fn with_intake_duplicates(mut self, duplicates: HashMap<String, usize>) -> Self {
        self.intake_duplicates = duplicates;
        self
    }

    /// Score every candidate and promote the top `top_per_source` of each source.
    #[instrument(skip_all, fields(scorer = %self.scorer.name(), top_per_source))]
    pub async fn run_promotion_pass(&self, top_per_source: usize) -> Result<PromotionOutcome> {
        let candidates = self
            .storage
            .query_items(StageCollection::Candidates, &ItemFilter::default())
            .await?;
        let mut outcome = PromotionOutcome::default();

        for (source_id, mut items) in group_by_source(candidates) {
            let fallback = score_with_fallback(self.scorer.as_ref(), &mut items, self.score_timeout).await;
            if fallback {
                outcome.fallback_sources.push(source_id.clone());
            }
            outcome.scored += items.len();

            rank(&mut items);
            let avg_score = mean(items.iter().filter_map(|i| i.score));
            let avg_promoted_score =
                mean(items.iter().take(top_per_source).filter_map(|i| i.score));
            let item_count = items.len();

            let mut duplicate_count = self.intake_duplicates.get(&source_id).copied().unwrap_or(0);
            for (position, mut item) in items.into_iter().enumerate() {
                let destination = if position < top_per_source {
                    item.status = ItemStatus::Pending;
                    item.rejection_reason = None;
                    StageCollection::Approvals
                } else {
                    item.status = ItemStatus::Rejected;
                    item.rejection_reason = Some(LOW_SCORE_REASON.to_string());
                    StageCollection::Archives
                };

                match self
                    .storage
                    .move_item(StageCollection::Candidates, destination, &item)
                    .await
                {
                    Ok(moved) => {
                        if moved.already_present {
                            duplicate_count += 1;
                        }
                        match destination {
                            StageCollection::Approvals => outcome.approved += 1,
                            _ => outcome.archived += 1,
                        }
                    }
                    Err(e) => {
                        warn!(
                            item_id = %item.id,
                            %destination,
                            error = %e,
                            "promotion move failed; candidate left in place"
                        );
                        outcome.failed_moves += 1;
                    }
                }
            }

            let stats = SourceStats {
                source_id,
                item_count,
                avg_score,
                avg_promoted_score,
                duplicate_count,
                fallback,
            };
            if let Err(e) = self.storage.record_source_stats(&stats).await {
                warn!(source_id = %stats.source_id, error = %e, "failed to record promotion stats");
            }
            outcome.stats.push(stats);
        }

        info!(
            scored = outcome.scored,
            approved = outcome.approved,
            archived = outcome.archived,
            failed_moves = outcome.failed_moves,
            fallback_sources = outcome.fallback_sources.len(),
            "promotion pass complete"
        );
        Ok(outcome)
    }
}

/// Score `items` in one batch call, bounded by `timeout`.
///
/// On any scorer failure, items keep their current order and receive
/// descending synthetic scores `n, n-1, …, 1`. Returns whether the fallback
/// was used.
pub async fn score_with_fallback(
    scorer: &dyn ScoreAdapter,
    items: &mut [ContentItem],
    timeout: Duration,
) -> bool {
    if items.is_empty() {
        return false;
    }

    let result = tokio::time::timeout(timeout, scorer.score_batch(items)).await;
    let failure = match result {
        Ok(Ok(scored)) => match apply_scores(items, &scored, scorer.name()) {
            Ok(()) => return false,
            Err(e) => e.to_string(),
        },
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("scoring timed out after {}s", timeout.as_secs()),
    };

    warn!(
        scorer = %scorer.name(),
        batch = items.len(),
        error = %failure,
        "scorer failed; ranking by scrape order"
    );
    let n = items.len();
    for (i, item) in items.iter_mut().enumerate() {
        item.score = Some((n - i) as f64);
        item.reasoning = Some(FALLBACK_REASONING.to_string());
        item.scorer_id = Some(FALLBACK_SCORER_ID.to_string());
    }
    true
}

/// Stable sort by score, highest first. Unscored and NaN-scored items sink.
pub fn rank(items: &mut [ContentItem]) {
    let key = |item: &ContentItem| item.score.filter(|s| !s.is_nan());
    items.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Group items by source, sources in first-seen order.
fn group_by_source(items: Vec<ContentItem>) -> Vec<(String, Vec<ContentItem>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ContentItem>)> = Vec::new();
    for item in items {
        match index.get(&item.source_id) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(item.source_id.clone(), groups.len());
                groups.push((item.source_id.clone(), vec![item]));
            }
        }
    }
    groups
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pressroom_scoring::{ScoredItem, ScoringError};
    use uuid::Uuid;

    struct FixedScorer(HashMap<String, f64>);

    #[async_trait]
    impl ScoreAdapter for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score_batch(
            &self,
            items: &[ContentItem],
        ) -> std::result::Result<Vec<ScoredItem>, ScoringError> {
            Ok(items
                .iter()
                .enumerate()
                .map(|(index, item)| ScoredItem {
                    index,
                    score: self.0.get(&item.title).copied().unwrap_or(0.0),
                    reasoning: "fixed".into(),
                })
                .collect())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl ScoreAdapter for FailingScorer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn score_batch(
            &self,
            _items: &[ContentItem],
        ) -> std::result::Result<Vec<ScoredItem>, ScoringError> {
            Err(ScoringError::Request("connection refused".into()))
        }
    }

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("pressroom_promo_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    async fn seed(storage: &Storage, source: &str, titles: &[&str]) {
        for title in titles {
            storage
                .insert_item(
                    StageCollection::Candidates,
                    &ContentItem::new(*title, format!("https://{source}.example/{title}"), source),
                )
                .await
                .unwrap();
        }
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let mut items: Vec<ContentItem> = ["a", "b", "c"]
            .iter()
            .map(|t| {
                let mut i = ContentItem::new(*t, "", "s");
                i.score = Some(5.0);
                i
            })
            .collect();
        items[2].score = Some(9.0);
        rank(&mut items);
        let order: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    #[test]
    fn rank_sinks_nan_scores() {
        let mut items: Vec<ContentItem> = [("a", 2.0), ("b", f64::NAN), ("c", 7.0), ("d", -1.0)]
            .iter()
            .map(|(t, s)| {
                let mut i = ContentItem::new(*t, "", "s");
                i.score = Some(*s);
                i
            })
            .collect();
        items.push(ContentItem::new("e", "", "s"));
        rank(&mut items);
        let order: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(order, ["c", "a", "d", "b", "e"]);
    }

    #[tokio::test]
    async fn groups_are_ranked_per_source() {
        let storage = test_storage().await;
        seed(&storage, "a", &["a1", "a2", "a3"]).await;
        seed(&storage, "b", &["b1"]).await;

        let scores = HashMap::from([
            ("a1".to_string(), 20.0),
            ("a2".to_string(), 90.0),
            ("a3".to_string(), 50.0),
            ("b1".to_string(), 1.0),
        ]);
        let engine = PromotionEngine::new(storage.clone(), Arc::new(FixedScorer(scores)));
        let outcome = engine.run_promotion_pass(1).await.unwrap();

        assert_eq!(outcome.scored, 4);
        assert_eq!(outcome.approved, 2);
        assert_eq!(outcome.archived, 2);
        assert!(outcome.fallback_sources.is_empty());

        let approved: Vec<String> = storage
            .query_items(StageCollection::Approvals, &ItemFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(approved, ["a2", "b1"]);

        let archived = storage
            .query_items(StageCollection::Archives, &ItemFilter::default())
            .await
            .unwrap();
        assert!(archived
            .iter()
            .all(|i| i.rejection_reason.as_deref() == Some(LOW_SCORE_REASON)));
        assert_eq!(storage.count_items(StageCollection::Candidates).await.unwrap(), 0);

        let a_stats = &outcome.stats[0];
        assert_eq!(a_stats.source_id, "a");
        assert!((a_stats.avg_score - 160.0 / 3.0).abs() < 1e-9);
        assert_eq!(a_stats.avg_promoted_score, 90.0);
        assert_eq!(storage.list_source_stats(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fallback_assigns_descending_scores_in_scrape_order() {
        let mut items = vec![
            ContentItem::new("first", "", "s"),
            ContentItem::new("second", "", "s"),
            ContentItem::new("third", "", "s"),
        ];
        let used = score_with_fallback(&FailingScorer, &mut items, Duration::from_secs(1)).await;
        assert!(used);
        let scores: Vec<f64> = items.iter().map(|i| i.score.unwrap()).collect();
        assert_eq!(scores, [3.0, 2.0, 1.0]);
        assert!(items
            .iter()
            .all(|i| i.reasoning.as_deref() == Some(FALLBACK_REASONING)));
    }

    #[tokio::test]
    async fn interrupted_pass_is_completed_without_duplicates() {
        let storage = test_storage().await;
        seed(&storage, "a", &["x"]).await;
        // An earlier pass already inserted the approval but died before the delete.
        storage
            .insert_item(
                StageCollection::Approvals,
                &ContentItem::new("x", "https://a.example/x", "a"),
            )
            .await
            .unwrap();

        let engine = PromotionEngine::new(storage.clone(), Arc::new(FailingScorer));
        let outcome = engine.run_promotion_pass(2).await.unwrap();
        assert_eq!(outcome.approved, 1);
        assert_eq!(outcome.stats[0].duplicate_count, 1);
        assert_eq!(storage.count_items(StageCollection::Approvals).await.unwrap(), 1);
        assert_eq!(storage.count_items(StageCollection::Candidates).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_move_leaves_candidate_in_place() {
        let tmp = std::env::temp_dir().join(format!("pressroom_promo_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        seed(&storage, "a", &["keep", "drop"]).await;

        // Second handle on the same file makes every archive insert fail.
        let db = libsql::Builder::new_local(&tmp).build().await.unwrap();
        db.connect()
            .unwrap()
            .execute(
                "CREATE TRIGGER archives_offline BEFORE INSERT ON archives
                 BEGIN SELECT RAISE(ABORT, 'archives offline'); END",
                (),
            )
            .await
            .unwrap();

        let scores = HashMap::from([("keep".to_string(), 80.0), ("drop".to_string(), 10.0)]);
        let engine = PromotionEngine::new(storage.clone(), Arc::new(FixedScorer(scores)));
        let outcome = engine.run_promotion_pass(1).await.unwrap();

        assert_eq!(outcome.approved, 1);
        assert_eq!(outcome.archived, 0);
        assert_eq!(outcome.failed_moves, 1);

        let left: Vec<String> = storage
            .query_items(StageCollection::Candidates, &ItemFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(left, ["drop"]);
        assert_eq!(storage.count_items(StageCollection::Archives).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn intake_duplicates_count_toward_source_stats() {
        let storage = test_storage().await;
        seed(&storage, "a", &["x"]).await;

        let engine = PromotionEngine::new(storage.clone(), Arc::new(FailingScorer))
            .with_intake_duplicates(HashMap::from([("a".to_string(), 3)]));
        let outcome = engine.run_promotion_pass(1).await.unwrap();
        assert_eq!(outcome.stats[0].duplicate_count, 3);
        assert_eq!(storage.list_source_stats(1).await.unwrap()[0].duplicate_count, 3);
    }
}
