//! Batch score adapters.
//!
//! A [`ScoreAdapter`] scores one source's batch in a single call. Failures are
//! reported as [`ScoringError`]; callers decide how to fall back.

pub mod error;
pub mod keyword;
pub mod openrouter;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pressroom_shared::{AppConfig, ContentItem, PipelineError, Result, validate_api_key};

pub use error::ScoringError;
pub use keyword::KeywordScorer;
pub use openrouter::{OpenRouterScorer, parse_scores};

/// Score for the item at `index` in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub index: usize,
    pub score: f64,
    pub reasoning: String,
}

#[async_trait]
pub trait ScoreAdapter: Send + Sync {
    /// Registry key, also recorded as each item's `scorer_id`.
    fn name(&self) -> &str;

    async fn score_batch(
        &self,
        items: &[ContentItem],
    ) -> std::result::Result<Vec<ScoredItem>, ScoringError>;
}

/// Write `scored` onto `items`. Every item must receive exactly one score.
pub fn apply_scores(
    items: &mut [ContentItem],
    scored: &[ScoredItem],
    scorer_id: &str,
) -> std::result::Result<(), ScoringError> {
    let mut seen = vec![false; items.len()];
    for s in scored {
        if let Some(item) = items.get_mut(s.index) {
            item.score = Some(s.score);
            item.reasoning = Some(s.reasoning.clone());
            item.scorer_id = Some(scorer_id.to_string());
            seen[s.index] = true;
        }
    }
    let got = seen.iter().filter(|s| **s).count();
    if got == items.len() {
        Ok(())
    } else {
        Err(ScoringError::Incomplete {
            expected: items.len(),
            got,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type ScorerFactory =
    Box<dyn Fn() -> std::result::Result<Arc<dyn ScoreAdapter>, String> + Send + Sync>;

/// Named score adapter factories.
pub struct ScoreAdapterRegistry {
    factories: BTreeMap<String, ScorerFactory>,
}

impl ScoreAdapterRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// `keyword` and `openrouter`, configured from `config`.
    ///
    /// The OpenRouter key is read from the environment when the scorer is
    /// loaded, so a missing key fails the run that asks for it.
    pub fn with_defaults(config: &AppConfig) -> Self {
        let mut registry = Self::empty();

        let scoring = config.scoring.clone();
        registry.register_factory("keyword", move || {
            Ok(Arc::new(KeywordScorer::from_config(&scoring)))
        });

        let openrouter = config.openrouter.clone();
        let timeout = Duration::from_secs(config.http.long_timeout_secs);
        registry.register_factory("openrouter", move || {
            let key = validate_api_key(&openrouter).map_err(|e| e.to_string())?;
            let scorer =
                OpenRouterScorer::new(&openrouter, key, timeout).map_err(|e| e.to_string())?;
            Ok(Arc::new(scorer))
        });

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ScoreAdapter>) {
        let name = adapter.name().to_string();
        self.factories
            .insert(name, Box::new(move || Ok(adapter.clone())));
    }

    pub fn register_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> std::result::Result<Arc<dyn ScoreAdapter>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn load(&self, name: &str) -> Result<Arc<dyn ScoreAdapter>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::adapter_load(name, "no such score adapter"))?;
        factory().map_err(|message| PipelineError::adapter_load(name, message))
    }
}

impl Default for ScoreAdapterRegistry {
    fn default() -> Self {
        Self::empty()
    }
}
