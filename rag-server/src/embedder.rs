//! Embedders that turn question text into query vectors.
//!
//! - [`FastEmbedder`]: local ONNX model via fastembed (default `BAAI/bge-small-en-v1.5`)
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`StubEmbedder`]: deterministic hash-based vectors, no model or network
//!
//! [`init_embedder`] builds the configured backend once at startup. A backend
//! that fails to initialize yields `None`, which the pipeline treats as a
//! sticky "no embedder" state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{EmbedderBackend, EmbedderConfig};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EmbedError {
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
    #[error("embedding backend error: {0}")]
    Backend(String),
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// Maps free text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// Build the configured embedder, or `None` when it is disabled or broken.
pub async fn init_embedder(config: &EmbedderConfig) -> Option<SharedEmbedder> {
    let result: Result<SharedEmbedder, EmbedError> = match config.backend {
        EmbedderBackend::Disabled => {
            tracing::warn!("Embedder disabled by configuration");
            return None;
        }
        EmbedderBackend::Stub => Ok(Arc::new(StubEmbedder::new(config.dimensions))),
        EmbedderBackend::OpenAi => OpenAiEmbedder::from_config(config).map(|e| Arc::new(e) as SharedEmbedder),
        EmbedderBackend::FastEmbed => {
            let config = config.clone();
            tokio::task::spawn_blocking(move || FastEmbedder::new(&config))
                .await
                .map_err(|e| EmbedError::Unavailable(format!("fastembed init panicked: {e}")))
                .and_then(|r| r)
                .map(|e| Arc::new(e) as SharedEmbedder)
        }
    };

    match result {
        Ok(embedder) => {
            tracing::info!(
                backend = config.backend.as_str(),
                model = embedder.model_name(),
                dimensions = embedder.dimensions(),
                "Embedder ready"
            );
            Some(embedder)
        }
        Err(e) => {
            tracing::error!(backend = config.backend.as_str(), error = %e, "Embedder failed to initialize");
            None
        }
    }
}

// ─── fastembed ───────────────────────────────────────────────────────────────

/// Local sentence-embedding model.
///
/// fastembed inference is blocking, so calls run on the blocking pool behind
/// a mutex around the single model session.
pub struct FastEmbedder {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
}

impl FastEmbedder {
    /// Load (downloading on first use) the configured model. Blocking.
    pub fn new(config: &EmbedderConfig) -> Result<Self, EmbedError> {
        let (model, dims) = fastembed_model(&config.model).ok_or_else(|| {
            EmbedError::Unavailable(format!("unsupported fastembed model '{}'", config.model))
        })?;

        let mut options = fastembed::InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = config.cache_dir.as_ref() {
            options = options.with_cache_dir(dir.clone());
        }

        let embedding = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| EmbedError::Unavailable(format!("fastembed load failed: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: config.model.clone(),
            dims,
        })
    }
}

/// Known model names and their output dimensions.
fn fastembed_model(name: &str) -> Option<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel;
    match name.trim() {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
            Some((EmbeddingModel::AllMiniLML6V2, 384))
        }
        _ => None,
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];
        let mut vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbedError::Backend("fastembed lock poisoned".to_string()))?;
            guard
                .embed(input, None)
                .map_err(|e| EmbedError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| EmbedError::Backend(format!("embedding task panicked: {e}")))??;

        vectors
            .pop()
            .ok_or_else(|| EmbedError::Backend("fastembed returned no vectors".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// ─── OpenAI-compatible HTTP ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Remote embedder speaking the OpenAI `/embeddings` protocol.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn from_config(config: &EmbedderConfig) -> Result<Self, EmbedError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| EmbedError::Unavailable("no embedding endpoint configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Unavailable(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dims: config.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", self.endpoint);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        });
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbedError::Backend(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Backend(format!("embedding API error {status}: {body}")));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Backend(format!("malformed embedding response: {e}")))?;
        let vector = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Backend("empty embedding response".to_string()))?;

        if vector.len() != self.dims {
            return Err(EmbedError::Backend(format!(
                "expected {}-dim embedding, got {}",
                self.dims,
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ─── Stub ────────────────────────────────────────────────────────────────────

/// Deterministic hash-based unit vectors.
///
/// Same text → same vector (distance 0); different texts → non-zero distance.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dims: usize,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dims);
        let mut counter: u32 = 0;
        while vector.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            for pair in hasher.finalize().chunks_exact(2) {
                if vector.len() == self.dims {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]) as f32;
                vector.push(raw / u16::MAX as f32 * 2.0 - 1.0);
            }
            counter += 1;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}
