//! Shared types between the answer service and its clients
//!
//! These types describe the JSON bodies of the HTTP surface:
//! - question/answer exchange (`/query`, `/api/answer`)
//! - readiness reports (`/health`, `/api/health/*`)
//!
//! Serializable with serde for JSON over HTTP

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Question / Answer
// ============================================================================

/// Body of a question sent to the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    /// The verbatim user question
    pub text: String,

    /// Caller identity, carried for logging only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Legacy answer shape: just the text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub answer: String,
}

/// Which terminal state of the answer pipeline produced an answer.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnswerOutcome {
    /// Language model answered from retrieved context
    Generated,
    /// Retrieved snippets formatted without a model
    Fallback,
    /// Embedder missing or failing
    NoEmbedder,
    /// No vector collection is ready
    Unavailable,
    /// Retrieval returned nothing
    NoMatches,
}

impl AnswerOutcome {
    /// True when the answer was built from retrieved passages.
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Generated | Self::Fallback)
    }
}

/// Detailed answer shape returned by `/api/answer`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResponse {
    pub answer: String,
    /// Number of retrieved passages the answer was built from
    pub source_count: usize,
    pub outcome: AnswerOutcome,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

/// Readiness of one dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    /// e.g. "vector-db", "embedder", "llm"
    pub service: String,
    pub message: String,
}

/// Readiness of one configured collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionHealth {
    pub name: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<usize>,
}

/// Overall report served by `/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<CollectionHealth>,
    pub started_at: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_user_id_is_optional() {
        let req: QueryRequest = serde_json::from_str(r#"{"text":"How do I add a cube?"}"#).unwrap();
        assert_eq!(req.text, "How do I add a cube?");
        assert!(req.user_id.is_none());

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("user_id"));
    }

    #[test]
    fn test_answer_outcome_serialization() {
        let json = serde_json::to_string(&AnswerOutcome::NoEmbedder).unwrap();
        assert_eq!(json, "\"no_embedder\"");
        assert_eq!(AnswerOutcome::NoEmbedder.to_string(), "no_embedder");
        let label: &'static str = AnswerOutcome::NoMatches.into();
        assert_eq!(label, "no_matches");

        let parsed: AnswerOutcome = serde_json::from_str("\"fallback\"").unwrap();
        assert_eq!(parsed, AnswerOutcome::Fallback);
    }

    #[test]
    fn test_grounded_outcomes() {
        assert!(AnswerOutcome::Generated.is_grounded());
        assert!(AnswerOutcome::Fallback.is_grounded());
        assert!(!AnswerOutcome::NoMatches.is_grounded());
        assert!(!AnswerOutcome::Unavailable.is_grounded());
    }

    #[test]
    fn test_health_status_serialization() {
        let component = ComponentHealth {
            status: HealthStatus::from_ready(false),
            service: "llm".to_string(),
            message: "API key not configured".to_string(),
        };
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["service"], "llm");
    }
}
