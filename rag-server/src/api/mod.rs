//! HTTP API routes for the answer service

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub mod health;
pub mod query;

use crate::app_state::AppState;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        // Question answering
        .route("/query", post(query::query))
        .route("/api/answer", post(query::answer))
        // Readiness
        .route("/health", get(health::health_report))
        .route("/api/health/vector-db", get(health::vector_db_health))
        .route("/api/health/embedder", get(health::embedder_health))
        .route("/api/health/llm", get(health::llm_health))
        .route("/api/health/groq", get(health::llm_health))
}
