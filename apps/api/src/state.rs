use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::analysis::hypotheses::HypothesisCatalog;
use crate::analysis::problems::{DetectorConfig, StageHypothesisMap};
use crate::analysis::recommender::{DisabledRecommender, LlmRecommender, Recommender};
use crate::config::Config;
use crate::funnel::store::{InMemorySnapshotStore, PgSnapshotStore, SnapshotStore};
use crate::llm_client::{self, LlmClient, LlmError};
use crate::profile::store::{InMemoryProfileStore, PgProfileStore, ProfileStore};
use crate::reflection::service::ReflectionService;
use crate::reflection::store::{FeedbackStore, InMemoryFeedbackStore, PgFeedbackStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub profiles: Arc<dyn ProfileStore>,
    /// Open reflection forms and the feedback log they write to.
    pub reflection: Arc<ReflectionService>,
    pub hypotheses: Arc<HypothesisCatalog>,
    /// Pluggable generator. `LlmRecommender` when an API key is configured.
    pub recommender: Arc<dyn Recommender>,
    pub detector: DetectorConfig,
}

impl AppState {
    /// Wires Postgres-backed stores when a pool is given, in-memory ones otherwise.
    pub fn new(config: Config, db: Option<PgPool>) -> Result<Self, LlmError> {
        let (snapshots, profiles, feedback): (
            Arc<dyn SnapshotStore>,
            Arc<dyn ProfileStore>,
            Arc<dyn FeedbackStore>,
        ) = match db {
            Some(pool) => (
                Arc::new(PgSnapshotStore::new(pool.clone())),
                Arc::new(PgProfileStore::new(pool.clone())),
                Arc::new(PgFeedbackStore::new(pool)),
            ),
            None => {
                warn!("No DATABASE_URL set, using in-memory stores (data is lost on restart)");
                (
                    Arc::new(InMemorySnapshotStore::new()),
                    Arc::new(InMemoryProfileStore::new()),
                    Arc::new(InMemoryFeedbackStore::new()),
                )
            }
        };

        let recommender: Arc<dyn Recommender> = match &config.anthropic_api_key {
            Some(key) => {
                info!("LLM client initialized (model: {})", llm_client::MODEL);
                Arc::new(LlmRecommender::new(LlmClient::new(key.clone())?))
            }
            None => {
                warn!("No ANTHROPIC_API_KEY set, recommendations return the prompt only");
                Arc::new(DisabledRecommender)
            }
        };

        let hypotheses = Arc::new(HypothesisCatalog::load(config.hypotheses_path.as_deref()));
        let detector = DetectorConfig {
            threshold_pct: config.problem_threshold_pct,
            min_denominator: config.problem_min_denominator,
            hypothesis_map: StageHypothesisMap::default(),
        };

        Ok(Self {
            config,
            snapshots,
            profiles,
            reflection: Arc::new(ReflectionService::new(feedback)),
            hypotheses,
            recommender,
            detector,
        })
    }

    /// In-memory state for tests, with a replaceable recommender.
    #[cfg(test)]
    pub fn for_tests(recommender: Arc<dyn Recommender>) -> Self {
        let config = Config::default();
        Self {
            detector: DetectorConfig {
                threshold_pct: config.problem_threshold_pct,
                min_denominator: config.problem_min_denominator,
                hypothesis_map: StageHypothesisMap::default(),
            },
            config,
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            profiles: Arc::new(InMemoryProfileStore::new()),
            reflection: Arc::new(ReflectionService::new(Arc::new(InMemoryFeedbackStore::new()))),
            hypotheses: Arc::new(HypothesisCatalog::builtin()),
            recommender,
        }
    }
}
