//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rag_server::config::{LlmConfig, SynthesisConfig};
use rag_server::embedder::{EmbedError, Embedder, SharedEmbedder, StubEmbedder};
use rag_server::llm::{LanguageModel, ModelError, SharedLanguageModel};
use rag_server::pipeline::AnswerPipeline;
use rag_server::retrieval::VectorIndex;
use rag_server::store::{Collection, CollectionInfo, StoreError};
use rag_server::synthesis::Synthesizer;
use rag_server::types::{DistanceMetric, Match, Metadata};

pub const DIMS: usize = 8;

/// Collection that returns a fixed list of matches, in the given order.
pub struct ScriptedCollection {
    info: CollectionInfo,
    matches: Vec<Match>,
}

impl ScriptedCollection {
    /// `hits` are `(distance, document, title)`.
    pub fn new(name: &str, hits: &[(f32, &str, Option<&str>)]) -> Self {
        let matches = hits
            .iter()
            .enumerate()
            .map(|(i, (distance, document, title))| Match {
                id: format!("{name}-{i}"),
                collection: name.to_string(),
                distance: *distance,
                document: document.to_string(),
                metadata: match title {
                    Some(t) => Metadata::new().with("title", *t),
                    None => Metadata::new(),
                },
            })
            .collect::<Vec<_>>();
        Self {
            info: CollectionInfo {
                name: name.to_string(),
                dimension: DIMS,
                metric: DistanceMetric::L2,
                documents: matches.len(),
            },
            matches,
        }
    }

    pub fn with_distances(name: &str, distances: &[f32]) -> Self {
        let docs: Vec<String> = distances
            .iter()
            .map(|d| format!("{name} passage at {d}"))
            .collect();
        let hits: Vec<(f32, &str, Option<&str>)> = distances
            .iter()
            .zip(docs.iter())
            .map(|(d, doc)| (*d, doc.as_str(), None))
            .collect();
        Self::new(name, &hits)
    }

    pub fn matches(&self) -> Vec<Match> {
        self.matches.clone()
    }

    pub fn shared(self) -> Arc<dyn Collection> {
        Arc::new(self)
    }
}

#[async_trait]
impl Collection for ScriptedCollection {
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    async fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<Match>, StoreError> {
        Ok(self.matches.iter().take(k).cloned().collect())
    }
}

/// Collection whose every search fails.
pub struct FailingCollection {
    info: CollectionInfo,
}

impl FailingCollection {
    pub fn new(name: &str) -> Self {
        Self {
            info: CollectionInfo {
                name: name.to_string(),
                dimension: DIMS,
                metric: DistanceMetric::L2,
                documents: 3,
            },
        }
    }

    pub fn shared(self) -> Arc<dyn Collection> {
        Arc::new(self)
    }
}

#[async_trait]
impl Collection for FailingCollection {
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    async fn search(&self, _vector: &[f32], _k: usize) -> Result<Vec<Match>, StoreError> {
        Err(StoreError::Task("disk read failed".to_string()))
    }
}

/// Collection whose searches never finish within any reasonable timeout.
pub struct HangingCollection {
    info: CollectionInfo,
}

impl HangingCollection {
    pub fn new(name: &str) -> Self {
        Self {
            info: CollectionInfo {
                name: name.to_string(),
                dimension: DIMS,
                metric: DistanceMetric::L2,
                documents: 1,
            },
        }
    }

    pub fn shared(self) -> Arc<dyn Collection> {
        Arc::new(self)
    }
}

#[async_trait]
impl Collection for HangingCollection {
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    async fn search(&self, _vector: &[f32], _k: usize) -> Result<Vec<Match>, StoreError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Backend("model session crashed".to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Embedder that never answers within any reasonable timeout.
pub struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(vec![0.0; DIMS])
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "hanging"
    }
}

pub fn stub_embedder() -> SharedEmbedder {
    Arc::new(StubEmbedder::new(DIMS))
}

/// Model double: replies with a fixed result after an optional delay and
/// records every prompt it receives.
pub struct ScriptedModel {
    reply: Result<String, ModelError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: ModelError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok("too late".to_string()),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn synthesizer(model: Option<SharedLanguageModel>, timeout: Duration) -> Synthesizer {
    let llm = LlmConfig {
        timeout,
        ..LlmConfig::default()
    };
    Synthesizer::new(model, &llm, SynthesisConfig::default())
}

pub fn pipeline(
    embedder: Option<SharedEmbedder>,
    index: VectorIndex,
    model: Option<SharedLanguageModel>,
) -> AnswerPipeline {
    AnswerPipeline::new(
        embedder,
        index,
        synthesizer(model, Duration::from_secs(5)),
        5,
        Duration::from_secs(5),
    )
}
