//! Question → embedding → retrieval → answer.
//!
//! Each gate is a `Result`-returning stage whose error is a [`Degradation`].
//! `answer` maps the first degradation hit to its canned answer, so every
//! question ends in an [`Answer`] and nothing is propagated to the caller.

use std::time::{Duration, Instant};

use shared_types::AnswerOutcome;

use crate::embedder::{EmbedError, SharedEmbedder};
use crate::retrieval::VectorIndex;
use crate::synthesis::Synthesizer;
use crate::types::{Answer, RankedResult};

/// Early exits taken before any model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Degradation {
    NoEmbedder,
    NoReadyCollections,
    NoMatches,
}

impl Degradation {
    pub fn outcome(self) -> AnswerOutcome {
        match self {
            Degradation::NoEmbedder => AnswerOutcome::NoEmbedder,
            Degradation::NoReadyCollections => AnswerOutcome::Unavailable,
            Degradation::NoMatches => AnswerOutcome::NoMatches,
        }
    }
}

pub struct AnswerPipeline {
    embedder: Option<SharedEmbedder>,
    index: VectorIndex,
    synthesizer: Synthesizer,
    top_k: usize,
    embed_timeout: Duration,
}

impl AnswerPipeline {
    pub fn new(
        embedder: Option<SharedEmbedder>,
        index: VectorIndex,
        synthesizer: Synthesizer,
        top_k: usize,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            synthesizer,
            top_k,
            embed_timeout,
        }
    }

    pub fn embedder(&self) -> Option<&SharedEmbedder> {
        self.embedder.as_ref()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer one question. Never fails.
    #[tracing::instrument(skip(self, question), fields(query_id = %ulid::Ulid::new()))]
    pub async fn answer(&self, question: &str) -> Answer {
        let started = Instant::now();
        tracing::info!(question_chars = question.chars().count(), "Answering question");

        let answer = match self.retrieve(question).await {
            Ok(ranked) => self.synthesizer.synthesize(question, &ranked).await,
            Err(degradation) => {
                tracing::warn!(degradation = %degradation, "Answering with canned message");
                self.degraded(degradation)
            }
        };

        tracing::info!(
            outcome = %answer.outcome,
            sources = answer.source_count,
            latency_ms = started.elapsed().as_millis() as u64,
            "Question answered"
        );
        answer
    }

    /// Run every gate up to synthesis.
    pub async fn retrieve(&self, question: &str) -> Result<RankedResult, Degradation> {
        let embedder = self.embedder.as_ref().ok_or(Degradation::NoEmbedder)?;
        if !self.index.is_ready() {
            return Err(Degradation::NoReadyCollections);
        }

        let vector = self.embed(embedder, question).await?;

        let ranked = self.index.query(&vector, self.top_k).await;
        tracing::debug!(hits = ranked.len(), distances = ?ranked.distances(), "Retrieved passages");
        if ranked.is_empty() {
            return Err(Degradation::NoMatches);
        }
        Ok(ranked)
    }

    async fn embed(&self, embedder: &SharedEmbedder, question: &str) -> Result<Vec<f32>, Degradation> {
        let result = tokio::time::timeout(self.embed_timeout, embedder.embed(question))
            .await
            .unwrap_or(Err(EmbedError::Timeout(self.embed_timeout)));
        result.map_err(|e| {
            tracing::error!(model = embedder.model_name(), error = %e, "Embedding failed");
            Degradation::NoEmbedder
        })
    }

    fn degraded(&self, degradation: Degradation) -> Answer {
        let messages = self.synthesizer.messages();
        let text = match degradation {
            Degradation::NoEmbedder => &messages.no_embedder,
            Degradation::NoReadyCollections => &messages.unavailable,
            Degradation::NoMatches => &messages.no_matches,
        };
        Answer::new(text.clone(), 0, degradation.outcome())
    }
}
