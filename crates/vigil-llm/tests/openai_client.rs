//! HTTP-level tests for the OpenAI-compatible client.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use vigil_llm::{
    ChatMessage, ChatProvider, EmbeddingProvider, LlmError, OpenAiClient, RetryPolicy,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
    }
}

fn client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(server.uri(), Some("sk-test".to_string()), "embed-small")
        .unwrap()
        .with_retry(fast_retry())
}

#[tokio::test]
async fn chat_returns_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Rust tooling"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .chat("chat-small", &[ChatMessage::user("label this")])
        .await
        .unwrap();

    assert_eq!(response.text, "Rust tooling");
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.total(), 15);
}

#[tokio::test]
async fn embeddings_are_reordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(response.vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    assert_eq!(response.usage.prompt_tokens, 4);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .chat("chat-small", &[ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(response.text, "ok");
}

#[tokio::test]
async fn rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let result = client(&server)
        .chat("chat-small", &[ChatMessage::user("hi")])
        .await;
    assert!(matches!(result, Err(LlmError::RateLimited { .. })));
}

#[tokio::test]
async fn auth_errors_fail_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .chat("chat-small", &[ChatMessage::user("hi")])
        .await;
    match result {
        Err(LlmError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("expected Api error, got {:?}", other.map(|r| r.text)),
    }
}

#[tokio::test]
async fn embedding_count_mismatch_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        })))
        .mount(&server)
        .await;

    let result = client(&server)
        .embed(&["a".to_string(), "b".to_string()])
        .await;
    assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
}
