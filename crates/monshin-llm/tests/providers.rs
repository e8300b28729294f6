//! Built-in provider wire behavior against a mock HTTP server.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use monshin_core::models::settings::ConnectionProfile;
use monshin_llm::error::LlmError;
use monshin_llm::ollama::OllamaProvider;
use monshin_llm::openai::OpenAiProvider;
use monshin_llm::provider::{ChatMessage, ChatParams, ChatRole, LlmProvider};

fn profile(server: &MockServer) -> ConnectionProfile {
    ConnectionProfile {
        base_url: Some(server.uri()),
        ..Default::default()
    }
}

fn params() -> ChatParams {
    ChatParams {
        model: "qwen2.5:7b".to_string(),
        temperature: 0.2,
    }
}

#[tokio::test]
async fn ollama_lists_models_from_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                { "name": "qwen2.5:7b" },
                { "name": "llama3.1:8b" },
            ]
        })))
        .mount(&server)
        .await;

    let models = OllamaProvider::new().list_models(&profile(&server)).await.unwrap();
    assert_eq!(models, vec!["qwen2.5:7b", "llama3.1:8b"]);
}

#[tokio::test]
async fn ollama_chat_sends_system_and_reads_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "qwen2.5:7b",
            "stream": false,
            "messages": [
                { "role": "system", "content": "あなたは問診アシスタントです" },
                { "role": "user", "content": "頭痛があります" },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": { "role": "assistant", "content": "いつ頃からですか?" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = OllamaProvider::new()
        .chat(
            &profile(&server),
            &params(),
            "あなたは問診アシスタントです",
            &[ChatMessage {
                role: ChatRole::User,
                content: "頭痛があります".to_string(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(reply, "いつ頃からですか?");
}

#[tokio::test]
async fn ollama_http_errors_become_remote_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = OllamaProvider::new()
        .chat(&profile(&server), &params(), "", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Remote(_)));
}

#[tokio::test]
async fn ollama_malformed_reply_is_a_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "unexpected": true
        })))
        .mount(&server)
        .await;

    let err = OllamaProvider::new()
        .chat(&profile(&server), &params(), "", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::ResponseParse(_)));
}

#[tokio::test]
async fn openai_sends_bearer_auth_and_reads_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "了解しました" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = ConnectionProfile {
        base_url: Some(server.uri()),
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    };
    let reply = OpenAiProvider::new()
        .chat(
            &profile,
            &params(),
            "",
            &[ChatMessage {
                role: ChatRole::User,
                content: "こんにちは".to_string(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(reply, "了解しました");
}

#[tokio::test]
async fn openai_lists_model_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [ { "id": "gpt-4o-mini" }, { "id": "gpt-4o" } ]
        })))
        .mount(&server)
        .await;

    let models = OpenAiProvider::new().list_models(&profile(&server)).await.unwrap();
    assert_eq!(models, vec!["gpt-4o-mini", "gpt-4o"]);
}

#[tokio::test]
async fn connectivity_check_fails_against_a_dead_endpoint() {
    // Bind-then-drop leaves a port with nothing listening.
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let profile = ConnectionProfile {
        base_url: Some(uri),
        ..Default::default()
    };
    let err = OllamaProvider::new()
        .check_connectivity(&profile)
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Remote(_)));
}
