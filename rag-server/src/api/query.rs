//! Question endpoints.
//!
//! Both endpoints always answer 200 for a well-formed body: degradation is
//! reported in the answer text (and in `outcome` on `/api/answer`).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use shared_types::{AnswerResponse, QueryRequest, QueryResponse};

use crate::api::ApiState;
use crate::types::Answer;

/// Legacy shape: `{text}` in, `{answer}` out.
pub async fn query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    let answer = run(&state, &req).await;
    (StatusCode::OK, Json(QueryResponse { answer: answer.text }))
}

/// Answer with source count and outcome tag.
pub async fn answer(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> impl IntoResponse {
    let answer = run(&state, &req).await;
    (StatusCode::OK, Json(AnswerResponse::from(answer)))
}

async fn run(state: &ApiState, req: &QueryRequest) -> Answer {
    tracing::debug!(user_id = req.user_id.as_deref().unwrap_or("anonymous"), "Question received");
    let answer = state.app_state.pipeline().answer(&req.text).await;
    tracing::debug!(
        outcome = %answer.outcome,
        grounded = answer.outcome.is_grounded(),
        "Question handled"
    );
    answer
}
