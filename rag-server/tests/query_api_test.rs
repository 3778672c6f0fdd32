//! Query and health API integration tests

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use rag_server::api;
use rag_server::app_state::AppState;
use rag_server::embedder::SharedEmbedder;
use rag_server::llm::SharedLanguageModel;
use rag_server::retrieval::{CollectionHandle, VectorIndex};

use support::{pipeline, stub_embedder, ScriptedCollection, ScriptedModel};

fn setup_test_app(
    embedder: Option<SharedEmbedder>,
    index: VectorIndex,
    model: Option<SharedLanguageModel>,
) -> axum::Router {
    let app_state = Arc::new(AppState::new(pipeline(embedder, index, model)));
    api::router().with_state(api::ApiState { app_state })
}

fn guides_index() -> VectorIndex {
    VectorIndex::from_collections(vec![
        ScriptedCollection::new(
            "merged_collection",
            &[(0.3, "Press Tab to toggle Edit Mode.", Some("Edit Mode"))],
        )
        .shared(),
        ScriptedCollection::new("langchain", &[(0.1, "Use Shift+A to add objects.", None)]).shared(),
    ])
}

async fn json_response(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value: Value = serde_json::from_slice(&body).expect("Invalid JSON response");
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_query_returns_answer_text() {
    let app = setup_test_app(Some(stub_embedder()), guides_index(), None);

    let (status, body) = json_response(
        &app,
        post_json("/query", json!({"text": "How do I add a cube?", "user_id": "u-1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().expect("answer string");
    assert!(answer.starts_with("Based on the retrieved context:"));
    // Nearest passage (from the second collection) is listed first.
    assert!(answer.find("Blender Guide").unwrap() < answer.find("Edit Mode").unwrap());
    assert_eq!(body.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_answer_endpoint_reports_outcome() {
    let model = ScriptedModel::replying("Use Shift+A.");
    let app = setup_test_app(
        Some(stub_embedder()),
        guides_index(),
        Some(model as SharedLanguageModel),
    );

    let (status, body) =
        json_response(&app, post_json("/api/answer", json!({"text": "How do I add a cube?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "generated");
    assert_eq!(body["source_count"], 2);
    assert!(body["answer"]
        .as_str()
        .unwrap()
        .ends_with("*Source: 2 relevant guides from the Blender knowledge base.*"));
}

#[tokio::test]
async fn test_degraded_service_still_answers_ok() {
    let app = setup_test_app(None, guides_index(), None);

    let (status, body) =
        json_response(&app, post_json("/api/answer", json!({"text": "How do I bevel?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "no_embedder");
    assert_eq!(body["source_count"], 0);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = setup_test_app(Some(stub_embedder()), guides_index(), None);

    let response = app
        .oneshot(post_json("/query", json!({"question": "wrong field"})))
        .await
        .expect("Request failed");

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_component_health_reflects_startup_state() {
    let index = VectorIndex::from_handles(vec![CollectionHandle::not_ready(
        "merged_collection",
        "collection not found: merged_collection",
    )]);
    let app = setup_test_app(Some(stub_embedder()), index, None);

    let (status, body) = json_response(&app, get("/api/health/vector-db")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["service"], "vector-db");

    let (_, body) = json_response(&app, get("/api/health/embedder")).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["message"].as_str().unwrap().contains("stub"));

    let (_, body) = json_response(&app, get("/api/health/llm")).await;
    assert_eq!(body["status"], "unhealthy");
    assert!(body["message"].as_str().unwrap().contains("GROQ_API_KEY"));

    // Legacy path for the model check answers the same report.
    let (status, alias) = json_response(&app, get("/api/health/groq")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alias, body);
    assert_eq!(alias["service"], "llm");
}

#[tokio::test]
async fn test_health_report_lists_collections() {
    let index = VectorIndex::from_handles(vec![
        CollectionHandle::ready(ScriptedCollection::new("merged_collection", &[(0.1, "a", None)]).shared()),
        CollectionHandle::not_ready("langchain", "collection not found: langchain"),
    ]);
    let model = ScriptedModel::replying("ok");
    let app = setup_test_app(Some(stub_embedder()), index, Some(model as SharedLanguageModel));

    let (status, body) = json_response(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"].as_array().unwrap().len(), 3);
    assert_eq!(body["components"][2]["status"], "healthy");
    assert_eq!(
        body["collections"],
        json!([
            {"name": "merged_collection", "ready": true, "documents": 1},
            {"name": "langchain", "ready": false}
        ])
    );
    assert!(body["started_at"].is_string());
}
