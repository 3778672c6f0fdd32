//! Answer synthesis from retrieved passages.
//!
//! With a language model configured, the passages become the context of a
//! single constrained prompt. Without one, or when the call fails in any way,
//! the passages are formatted deterministically into quoted snippets.
//! `synthesize` never fails.

use std::time::{Duration, Instant};

use shared_types::AnswerOutcome;

use crate::config::{LlmConfig, SynthesisConfig};
use crate::llm::{ModelError, SharedLanguageModel};
use crate::types::{Answer, RankedResult};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
pub const FALLBACK_HEADER: &str = "Based on the retrieved context:\n\n";

/// Fixed user-facing texts for the terminal states of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedMessages {
    pub no_embedder: String,
    pub unavailable: String,
    pub no_matches: String,
}

impl CannedMessages {
    pub fn new(knowledge_base: &str) -> Self {
        Self {
            no_embedder: "I'm sorry, the AI system is unavailable due to a technical issue. Please try again later.".to_string(),
            unavailable: "I'm sorry, the AI system is currently unavailable. Please try again later.".to_string(),
            no_matches: format!(
                "I'm sorry, I could not find any relevant information for your question in the {knowledge_base} knowledge base."
            ),
        }
    }
}

pub struct Synthesizer {
    model: Option<SharedLanguageModel>,
    settings: SynthesisConfig,
    messages: CannedMessages,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    /// Named in the fallback disclaimer
    credential_env: String,
}

impl Synthesizer {
    pub fn new(
        model: Option<SharedLanguageModel>,
        llm: &LlmConfig,
        settings: SynthesisConfig,
    ) -> Self {
        Self {
            model,
            messages: CannedMessages::new(&settings.knowledge_base),
            settings,
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            timeout: llm.timeout,
            credential_env: llm.api_key_env.clone(),
        }
    }

    pub fn messages(&self) -> &CannedMessages {
        &self.messages
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(|m| m.model_name())
    }

    pub fn credential_env(&self) -> &str {
        &self.credential_env
    }

    pub fn knowledge_base(&self) -> &str {
        &self.settings.knowledge_base
    }

    pub async fn synthesize(&self, question: &str, ranked: &RankedResult) -> Answer {
        if ranked.is_empty() {
            return Answer::new(self.messages.no_matches.clone(), 0, AnswerOutcome::NoMatches);
        }

        if let Some(model) = self.model.as_ref() {
            let started = Instant::now();
            match self.generate(model, question, ranked).await {
                Ok(text) => {
                    tracing::info!(
                        model = model.model_name(),
                        sources = ranked.len(),
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Model answer generated"
                    );
                    return Answer::new(text, ranked.len(), AnswerOutcome::Generated);
                }
                Err(e) => {
                    tracing::warn!(
                        model = model.model_name(),
                        error = %e,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Model call failed; using fallback answer"
                    );
                }
            }
        }

        self.fallback(ranked)
    }

    async fn generate(
        &self,
        model: &SharedLanguageModel,
        question: &str,
        ranked: &RankedResult,
    ) -> Result<String, ModelError> {
        let prompt = build_prompt(&self.settings.knowledge_base, &context_block(ranked), question);
        let completion = tokio::time::timeout(
            self.timeout,
            model.complete(&prompt, self.max_tokens, self.temperature),
        )
        .await
        .map_err(|_| ModelError::Timeout(self.timeout))??;

        Ok(format!(
            "{completion}\n\n*Source: {} relevant guides from the {} knowledge base.*",
            ranked.len(),
            self.settings.knowledge_base
        ))
    }

    /// Deterministic answer built only from the passages.
    pub fn fallback(&self, ranked: &RankedResult) -> Answer {
        if ranked.is_empty() {
            return Answer::new(self.messages.no_matches.clone(), 0, AnswerOutcome::NoMatches);
        }
        let text = fallback_text(ranked, &self.settings, &self.credential_env);
        Answer::new(text, ranked.len(), AnswerOutcome::Fallback)
    }
}

/// Passages joined most-relevant first.
pub fn context_block(ranked: &RankedResult) -> String {
    ranked.documents().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

pub fn build_prompt(knowledge_base: &str, context: &str, question: &str) -> String {
    format!(
        "You are an expert assistant for {knowledge_base}. First, try to answer the user's question using ONLY the context provided.\n\
If the context is not helpful or does not contain the answer, you may use your general knowledge to answer the question about {knowledge_base}.\n\
If the question is not related to {knowledge_base}, politely explain that you can only help with {knowledge_base} topics.\n\
\n\
CONTEXT:\n\
{context}\n\
\n\
USER QUESTION: {question}\n\
\n\
Please provide a comprehensive answer based on the context above:"
    )
}

/// First `limit` whitespace-separated words of `text`, single-spaced.
pub fn snippet(text: &str, limit: usize) -> String {
    text.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}

pub fn fallback_text(ranked: &RankedResult, settings: &SynthesisConfig, credential_env: &str) -> String {
    let mut text = String::from(FALLBACK_HEADER);
    for hit in ranked {
        let title = hit
            .metadata
            .get_or("title", &settings.default_source_label);
        text.push_str(&format!("**From {title}:**\n"));
        text.push_str(&format!(
            "\"{}...\"\n\n",
            snippet(&hit.document, settings.snippet_words)
        ));
    }
    text.push_str(&format!(
        "\n*Note: This is a fallback response. For a full AI answer, configure the {credential_env}.*"
    ));
    text
}
