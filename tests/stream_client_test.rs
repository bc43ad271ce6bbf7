//! Integration tests for the AI-feedback stream consumer.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{identity_with, StaticTokens};
use moodiary::{ApiClient, ApiError, StreamClient};

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

fn collecting() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str)) {
    let deltas = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&deltas);
    (deltas, move |delta: &str| {
        sink.lock().unwrap().push(delta.to_string())
    })
}

#[tokio::test]
async fn accumulates_deltas_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse_response(
            "data: It sounds like\n\ndata:  a peaceful day.\n\nevent: done\n\ndata: after the end\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api.clone());
    let (deltas, on_delta) = collecting();

    let text = stream.ai_feedback(7, on_delta).await.unwrap();
    assert_eq!(text, "It sounds like a peaceful day.");
    // Nothing after the `done` record is delivered.
    assert_eq!(
        deltas.lock().unwrap().clone(),
        vec!["It sounds like".to_string(), " a peaceful day.".to_string()]
    );

    let state = api.request_state();
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn error_record_fails_with_its_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(sse_response("data: partial\n\nevent: error\ndata: boom\n\n"))
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api.clone());
    let (deltas, on_delta) = collecting();

    let err = stream.ai_feedback(7, on_delta).await.unwrap_err();
    match err {
        ApiError::StreamProtocol(message) => assert_eq!(message, "boom"),
        other => panic!("expected StreamProtocol, got {:?}", other),
    }
    // Deltas before the failure were still delivered.
    assert_eq!(deltas.lock().unwrap().clone(), vec!["partial".to_string()]);
    assert!(api.request_state().error.is_some());
}

#[tokio::test]
async fn bare_done_yields_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(sse_response("event: done\n\n"))
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api);
    let text = stream.ai_feedback(7, |_| {}).await.unwrap();
    assert_eq!(text, "");
}

#[tokio::test]
async fn transport_close_without_terminal_record_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(sse_response("data: trailing thought \n\n"))
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api);
    let text = stream.ai_feedback(7, |_| {}).await.unwrap();
    // Outer whitespace is trimmed from the final result.
    assert_eq!(text, "trailing thought");
}

#[tokio::test]
async fn handshake_401_without_identity_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api);
    let err = stream.ai_feedback(7, |_| {}).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
}

#[tokio::test]
async fn handshake_401_recovers_once_like_json_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(sse_response("data: healed\n\nevent: done\n\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "login successful",
            "user": {
                "id": 1,
                "firebase_uid": "uid-1",
                "email": "uid-1@example.com",
                "created_at": "2026-01-01T00:00:00Z"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let tokens = StaticTokens::new("fresh-token");
    api.identity_slot()
        .set(Some(identity_with("uid-1", tokens)))
        .await;

    let stream = StreamClient::new(api);
    let text = stream.ai_feedback(7, |_| {}).await.unwrap();
    assert_eq!(text, "healed");
}

#[tokio::test]
async fn handshake_non_2xx_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/diaries/7/ai-feedback"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "detail": "diary not found" })),
        )
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let stream = StreamClient::new(api);
    let err = stream.ai_feedback(7, |_| {}).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "diary not found");
}
