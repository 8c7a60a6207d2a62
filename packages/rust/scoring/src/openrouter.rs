//! LLM batch scorer over the OpenRouter chat-completions API.
//!
//! One request per batch. The model is asked for a JSON array of
//! `{index, score, reasoning}` objects; code fences and surrounding prose in
//! the reply are tolerated.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use pressroom_shared::{ContentItem, OpenRouterConfig};

use crate::{ScoreAdapter, ScoredItem, ScoringError};

/// Body characters sent per item.
const MAX_BODY_CHARS: usize = 1200;

const SYSTEM_PROMPT: &str = "You are an editor ranking incoming items for a publication. \
Score each item from 0 to 100 for relevance, novelty and public interest. \
Reply with only a JSON array, one object per item: \
[{\"index\": <item index>, \"score\": <0-100>, \"reasoning\": \"<one sentence>\"}]";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct PromptItem<'a> {
    index: usize,
    title: &'a str,
    source: &'a str,
    link: &'a str,
    body: String,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    index: usize,
    score: f64,
    #[serde(default)]
    reasoning: String,
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct OpenRouterScorer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenRouterScorer {
    pub fn new(config: &OpenRouterConfig, api_key: String, timeout: Duration) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Pressroom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScoringError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.default_model.clone(),
            api_key,
            timeout,
        })
    }

    fn build_prompt(items: &[ContentItem]) -> Result<String, ScoringError> {
        let prompt_items: Vec<PromptItem<'_>> = items
            .iter()
            .enumerate()
            .map(|(index, item)| PromptItem {
                index,
                title: &item.title,
                source: &item.source_id,
                link: &item.link,
                body: item.body.chars().take(MAX_BODY_CHARS).collect(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&prompt_items)
            .map_err(|e| ScoringError::InvalidResponse(format!("prompt serialization: {e}")))?;
        Ok(format!("Score these {} items:\n{json}", items.len()))
    }
}

#[async_trait]
impl ScoreAdapter for OpenRouterScorer {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip_all, fields(model = %self.model, batch = items.len()))]
    async fn score_batch(&self, items: &[ContentItem]) -> Result<Vec<ScoredItem>, ScoringError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_prompt(items)?,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScoringError::Timeout(self.timeout.as_secs())
                } else {
                    ScoringError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScoringError::InvalidResponse("no choices in response".into()))?;

        debug!(chars = content.len(), "scorer reply received");
        parse_scores(&content, items.len())
    }
}

/// Parse the model's reply into one score per batch index.
///
/// Out-of-range indexes are dropped; a repeated index keeps its first score.
/// Every index in `0..expected` must be present.
pub fn parse_scores(reply: &str, expected: usize) -> Result<Vec<ScoredItem>, ScoringError> {
    let start = reply.find('[');
    let end = reply.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(ScoringError::InvalidResponse(
                "reply contains no JSON array".into(),
            ));
        }
    };

    let raw: Vec<RawScore> = serde_json::from_str(json)
        .map_err(|e| ScoringError::InvalidResponse(format!("bad score array: {e}")))?;

    let mut slots: Vec<Option<ScoredItem>> = (0..expected).map(|_| None).collect();
    for entry in raw {
        if !entry.score.is_finite() {
            warn!(index = entry.index, "non-finite score dropped");
            continue;
        }
        match slots.get_mut(entry.index) {
            Some(slot @ None) => {
                *slot = Some(ScoredItem {
                    index: entry.index,
                    score: entry.score.clamp(0.0, 100.0),
                    reasoning: entry.reasoning,
                });
            }
            Some(Some(_)) => debug!(index = entry.index, "duplicate score ignored"),
            None => warn!(index = entry.index, expected, "score for unknown index dropped"),
        }
    }

    let scored: Vec<ScoredItem> = slots.into_iter().flatten().collect();
    if scored.len() != expected {
        return Err(ScoringError::Incomplete {
            expected,
            got: scored.len(),
        });
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scorer(endpoint: String, timeout: Duration) -> OpenRouterScorer {
        let config = OpenRouterConfig {
            endpoint,
            ..OpenRouterConfig::default()
        };
        OpenRouterScorer::new(&config, "test-key".into(), timeout).unwrap()
    }

    fn items() -> Vec<ContentItem> {
        vec![
            ContentItem::new("First", "https://a.example/1", "a"),
            ContentItem::new("Second", "https://a.example/2", "a"),
        ]
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "Here you go:\n```json\n[{\"index\":1,\"score\":40,\"reasoning\":\"ok\"},{\"index\":0,\"score\":120}]\n```";
        let scored = parse_scores(reply, 2).unwrap();
        assert_eq!(scored[0].index, 0);
        assert_eq!(scored[0].score, 100.0);
        assert_eq!(scored[1].score, 40.0);
    }

    #[test]
    fn missing_index_is_incomplete() {
        let err = parse_scores(r#"[{"index":0,"score":5}]"#, 2).unwrap_err();
        assert!(matches!(err, ScoringError::Incomplete { expected: 2, got: 1 }));
        assert!(parse_scores("no scores today", 1).is_err());
    }

    #[tokio::test]
    async fn scores_batch_via_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(bearer_token("test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content":
                    "[{\"index\":0,\"score\":72,\"reasoning\":\"timely\"},{\"index\":1,\"score\":15,\"reasoning\":\"minor\"}]"
                }}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let scored = scorer(
            format!("{}/api/v1/chat/completions", server.uri()),
            Duration::from_secs(5),
        )
        .score_batch(&items())
        .await
        .expect("score");
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].score, 72.0);
        assert_eq!(scored[1].reasoning, "minor");
    }

    #[tokio::test]
    async fn api_error_and_timeout_are_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = scorer(format!("{}/down", server.uri()), Duration::from_secs(5))
            .score_batch(&items())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Api { status: 502, .. }));

        let err = scorer(format!("{}/slow", server.uri()), Duration::from_millis(50))
            .score_batch(&items())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Timeout(_)));
    }
}
