use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use equaled::{
    ai_service::{AiService, ASSISTANT_INSTRUCTION, UNAVAILABLE_MESSAGE},
    config::AiConfig,
    ApiError,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Stand-in for the Gemini REST API; the model name picks the behavior.
async fn generate_content(
    Path(model_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if query.get("key").map(String::as_str) != Some("test-key") {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "bad key" })));
    }
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
    assert!(prompt.starts_with(ASSISTANT_INSTRUCTION));
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);

    match model_action.trim_end_matches(":generateContent") {
        "missing-model" => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
        "broken-model" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))),
        "silent-model" => (StatusCode::OK, Json(json!({ "candidates": [] }))),
        _ => (
            StatusCode::OK,
            Json(json!({
                "candidates": [{
                    "content": { "parts": [
                        { "text": "A fraction is part of a whole. " },
                        { "text": "You are doing great!" }
                    ]}
                }]
            })),
        ),
    }
}

async fn spawn_fake_gemini() -> String {
    let app = Router::new().route("/models/:model_action", post(generate_content));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn service(base_url: &str, model: &str) -> AiService {
    AiService::new(&AiConfig {
        api_key: Some("test-key".to_string()),
        base_url: base_url.to_string(),
        model: model.to_string(),
    })
}

#[tokio::test]
async fn test_chat_joins_reply_parts() {
    let base_url = spawn_fake_gemini().await;
    let reply = service(&base_url, "gemini-1.5-flash")
        .chat("What is a fraction?")
        .await
        .unwrap();
    assert_eq!(reply, "A fraction is part of a whole. You are doing great!");
}

#[tokio::test]
async fn test_missing_model_is_bad_gateway() {
    let base_url = spawn_fake_gemini().await;
    match service(&base_url, "missing-model").chat("hi").await {
        Err(ApiError::AiError { status, message }) => {
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert!(message.contains("missing-model"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_failures_are_unavailable() {
    let base_url = spawn_fake_gemini().await;
    for model in ["broken-model", "silent-model"] {
        match service(&base_url, model).chat("hi").await {
            Err(ApiError::AiError { status, message }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "model {}", model);
                assert_eq!(message, UNAVAILABLE_MESSAGE);
            }
            other => panic!("unexpected result for {}: {:?}", model, other),
        }
    }
}

#[tokio::test]
async fn test_unreachable_upstream_is_unavailable() {
    // Nothing listens on the discard port.
    match service("http://127.0.0.1:9", "gemini-1.5-flash").chat("hi").await {
        Err(ApiError::AiError { status, .. }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
        other => panic!("unexpected result: {:?}", other),
    }
}
