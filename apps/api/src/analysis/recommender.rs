use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::bundle::RecommendationBundle;
use crate::analysis::prompts::RECOMMENDATION_SYSTEM;
use crate::llm_client::LlmClient;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum RecommendationOutcome {
    Generated(String),
    /// No generator configured, or it failed. The caller falls back to the
    /// rendered prompt.
    Unavailable,
}

/// Turns a bundle and its rendered prompt into recommendation text.
///
/// Implementations: `LlmRecommender` (default when an API key is set),
/// `DisabledRecommender`.
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, bundle: &RecommendationBundle, prompt: &str) -> RecommendationOutcome;
}

pub struct LlmRecommender {
    llm: LlmClient,
}

impl LlmRecommender {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Recommender for LlmRecommender {
    async fn recommend(&self, bundle: &RecommendationBundle, prompt: &str) -> RecommendationOutcome {
        match self.llm.call_text(prompt, RECOMMENDATION_SYSTEM).await {
            Ok(text) => {
                info!(
                    "Generated recommendations for {} problem stages ({} chars)",
                    bundle.problems.len(),
                    text.len()
                );
                RecommendationOutcome::Generated(text)
            }
            Err(e) => {
                warn!("Recommendation generator unavailable: {e}");
                RecommendationOutcome::Unavailable
            }
        }
    }
}

pub struct DisabledRecommender;

#[async_trait]
impl Recommender for DisabledRecommender {
    async fn recommend(&self, _bundle: &RecommendationBundle, _prompt: &str) -> RecommendationOutcome {
        RecommendationOutcome::Unavailable
    }
}

/// Returns canned text. Used to exercise the generated path.
#[cfg(test)]
pub struct FixedRecommender(pub String);

#[cfg(test)]
#[async_trait]
impl Recommender for FixedRecommender {
    async fn recommend(&self, _bundle: &RecommendationBundle, _prompt: &str) -> RecommendationOutcome {
        RecommendationOutcome::Generated(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::bundle::build_recommendation_bundle;

    #[tokio::test]
    async fn test_disabled_is_unavailable() {
        let bundle = build_recommendation_bundle(None, &[], &[], &[]);
        let outcome = DisabledRecommender.recommend(&bundle, "prompt").await;
        assert_eq!(outcome, RecommendationOutcome::Unavailable);
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let json = serde_json::to_value(RecommendationOutcome::Generated("1. Apply".to_string()))
            .unwrap();
        assert_eq!(json["status"], "generated");
        assert_eq!(json["text"], "1. Apply");
        let json = serde_json::to_value(RecommendationOutcome::Unavailable).unwrap();
        assert_eq!(json["status"], "unavailable");
    }
}
