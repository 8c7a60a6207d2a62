//! Deterministic local scorer driven by configured keyword weights.

use async_trait::async_trait;

use pressroom_shared::{ContentItem, ScoringConfig};

use crate::{ScoreAdapter, ScoredItem, ScoringError};

/// Scores items as `baseline + Σ weight × occurrences`, title hits counting
/// double, clamped to 0–100.
pub struct KeywordScorer {
    baseline: f64,
    /// Lowercased keyword and its weight.
    keywords: Vec<(String, f64)>,
}

impl KeywordScorer {
    pub fn new(baseline: f64, keywords: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            baseline,
            keywords: keywords
                .into_iter()
                .map(|(k, w)| (k.to_lowercase(), w))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.baseline,
            config.keywords.iter().map(|(k, w)| (k.clone(), *w)),
        )
    }

    fn score_one(&self, item: &ContentItem) -> (f64, String) {
        let title = item.title.to_lowercase();
        let body = item.body.to_lowercase();

        let mut score = self.baseline;
        let mut hits = Vec::new();
        for (keyword, weight) in &self.keywords {
            let count = title.matches(keyword.as_str()).count() * 2
                + body.matches(keyword.as_str()).count();
            if count > 0 {
                score += weight * count as f64;
                hits.push(format!("{keyword}×{count}"));
            }
        }

        let reasoning = if hits.is_empty() {
            "no keyword matches".to_string()
        } else {
            format!("matched {}", hits.join(", "))
        };
        (score.clamp(0.0, 100.0), reasoning)
    }
}

#[async_trait]
impl ScoreAdapter for KeywordScorer {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn score_batch(&self, items: &[ContentItem]) -> Result<Vec<ScoredItem>, ScoringError> {
        Ok(items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let (score, reasoning) = self.score_one(item);
                ScoredItem {
                    index,
                    score,
                    reasoning,
                }
            })
            .collect())
    }
}
