//! Readiness endpoints.
//!
//! Reports reflect the state captured at startup. Every endpoint answers 200;
//! the `status` field carries readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use shared_types::{CollectionHealth, ComponentHealth, HealthReport, HealthStatus};

use crate::api::ApiState;
use crate::app_state::AppState;

pub async fn health_report(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_report(&state.app_state)))
}

pub async fn vector_db_health(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(vector_db(&state.app_state)))
}

pub async fn embedder_health(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(embedder(&state.app_state)))
}

pub async fn llm_health(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(llm(&state.app_state)))
}

/// Overall status is healthy when questions can reach retrieval.
pub fn build_report(app_state: &AppState) -> HealthReport {
    let components = vec![vector_db(app_state), embedder(app_state), llm(app_state)];
    let pipeline = app_state.pipeline();
    let status = HealthStatus::from_ready(pipeline.embedder().is_some() && pipeline.index().is_ready());

    let collections = pipeline
        .index()
        .handles()
        .iter()
        .map(|h| CollectionHealth {
            name: h.name().to_string(),
            ready: h.is_ready(),
            documents: h.info().map(|info| info.documents),
        })
        .collect();

    HealthReport {
        status,
        components,
        collections,
        started_at: app_state.started_at(),
        checked_at: Utc::now(),
    }
}

fn vector_db(app_state: &AppState) -> ComponentHealth {
    let index = app_state.pipeline().index();
    let configured = index.handles().len();
    let ready = index.ready_count();
    let message = if ready > 0 {
        format!("Vector database is ready ({ready} of {configured} collections loaded)")
    } else {
        "Vector database is not ready".to_string()
    };
    ComponentHealth {
        status: HealthStatus::from_ready(ready > 0),
        service: "vector-db".to_string(),
        message,
    }
}

fn embedder(app_state: &AppState) -> ComponentHealth {
    let (ready, message) = match app_state.pipeline().embedder() {
        Some(e) => (
            true,
            format!("Embedder {} is ready ({} dimensions)", e.model_name(), e.dimensions()),
        ),
        None => (false, "Embedder is not initialized".to_string()),
    };
    ComponentHealth {
        status: HealthStatus::from_ready(ready),
        service: "embedder".to_string(),
        message,
    }
}

fn llm(app_state: &AppState) -> ComponentHealth {
    let synthesizer = app_state.pipeline().synthesizer();
    let (ready, message) = match synthesizer.model_name() {
        Some(model) => (true, format!("Language model {model} is configured")),
        None => (
            false,
            format!(
                "Language model is not configured (set {}); answers use the fallback formatter",
                synthesizer.credential_env()
            ),
        ),
    };
    ComponentHealth {
        status: HealthStatus::from_ready(ready),
        service: "llm".to_string(),
        message,
    }
}
