use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::embedder::init_embedder;
use crate::llm::init_language_model;
use crate::pipeline::AnswerPipeline;
use crate::retrieval::{CollectionHandle, EmbeddingSpace, VectorIndex};
use crate::store::SqliteCollectionStore;
use crate::synthesis::Synthesizer;

/// Process-wide context, built once at startup and read-only afterwards.
///
/// Readiness of the embedder, the collections and the model is fixed here;
/// nothing is retried per request.
pub struct AppState {
    pipeline: AnswerPipeline,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: AnswerPipeline) -> Self {
        Self {
            pipeline,
            started_at: Utc::now(),
        }
    }

    /// Open every dependency named by `config`. Failures degrade, never abort.
    pub async fn initialize(config: &Config) -> Self {
        let embedder = init_embedder(&config.embedder).await;
        let space = embedder.as_ref().map(|e| EmbeddingSpace {
            dimension: e.dimensions(),
            metric: config.distance_metric,
        });

        let index = match SqliteCollectionStore::open(&config.vector_db_path) {
            Ok(store) => VectorIndex::open(&store, &config.collections, space).await,
            Err(e) => {
                tracing::error!(
                    path = %config.vector_db_path,
                    error = %e,
                    "Failed to open vector database; no collection will be ready"
                );
                VectorIndex::from_handles(
                    config
                        .collections
                        .iter()
                        .map(|name| CollectionHandle::not_ready(name.clone(), e.to_string()))
                        .collect(),
                )
            }
        };

        let index = index.with_search_timeout(config.search_timeout);

        let model = init_language_model(&config.llm);
        let synthesizer = Synthesizer::new(model, &config.llm, config.synthesis.clone());
        let pipeline = AnswerPipeline::new(
            embedder,
            index,
            synthesizer,
            config.top_k,
            config.embedder.timeout,
        );

        tracing::info!(
            embedder_ready = pipeline.embedder().is_some(),
            collections_ready = pipeline.index().ready_count(),
            collections_configured = config.collections.len(),
            model_enabled = pipeline.synthesizer().model_name().is_some(),
            "Answer pipeline initialized"
        );

        Self::new(pipeline)
    }

    pub fn pipeline(&self) -> &AnswerPipeline {
        &self.pipeline
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
