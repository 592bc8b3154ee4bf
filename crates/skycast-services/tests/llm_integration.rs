//! Integration tests for LlmClient using wiremock.

use skycast_core::{LlmConfig, LlmError};
use skycast_services::{LlmClient, RetryConfig};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> LlmConfig {
    LlmConfig {
        api_key: "test-key".to_string(),
        api_url: format!("{}/v1/chat/completions", server.uri()),
        model: "gpt-4".to_string(),
        timeout_secs: 5,
        max_retries: 2,
        initial_retry_delay_ms: 10,
        max_retry_delay_ms: 50,
    }
}

/// Chat-completions body wrapping `content` as the assistant message
fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

const REPORT: &str = r#"{
    "prediction_12h": {"temperature": {"min": 4.0, "max": 9.5}},
    "prediction_24h": {"temperature": {"min": 2.0, "max": 11.0}},
    "reasoning": "Bleep! Mild and steady.",
    "confidence": 0.75
}"#;

#[tokio::test]
async fn test_generate_report_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPORT)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let report = client.generate_report("How is the weather?").await.unwrap();

    assert_eq!(report.reasoning, "Bleep! Mild and steady.");
    assert_eq!(report.confidence, 0.75);
    let temp = report.prediction_24h.temperature.unwrap();
    assert_eq!(temp.min, Some(2.0));
    assert_eq!(temp.max, Some(11.0));
}

#[tokio::test]
async fn test_generate_report_sends_system_and_user_messages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("weather reporting robot"))
        .and(body_string_contains("Report please"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPORT)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    assert!(client.generate_report("Report please").await.is_ok());
}

#[tokio::test]
async fn test_generate_report_list_answer_uses_first_item() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"[{"reasoning": "first", "confidence": 0.3}, {"reasoning": "second"}]"#,
        )))
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let report = client.generate_report("prompt").await.unwrap();

    assert_eq!(report.reasoning, "first");
    assert_eq!(report.confidence, 0.3);
}

#[tokio::test]
async fn test_generate_report_retries_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPORT)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let report = client.generate_report("prompt").await.unwrap();
    assert_eq!(report.confidence, 0.75);
}

#[tokio::test]
async fn test_generate_report_gives_up_after_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let err = client.generate_report("prompt").await.unwrap_err();

    match err {
        LlmError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_report_bad_request_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("model not found"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let err = client.generate_report("prompt").await.unwrap_err();

    assert!(matches!(err, LlmError::Api { status: 400, .. }));
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn test_generate_report_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server))
        .unwrap()
        .with_retry(RetryConfig::disabled());
    let err = client.generate_report("prompt").await.unwrap_err();

    assert!(matches!(err, LlmError::Unauthorized));
}

#[tokio::test]
async fn test_generate_report_empty_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let err = client.generate_report("prompt").await.unwrap_err();

    assert!(matches!(err, LlmError::EmptyResponse));
}

#[tokio::test]
async fn test_generate_report_non_json_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sunny all day!")))
        .mount(&mock_server)
        .await;

    let client = LlmClient::new(&config_for(&mock_server)).unwrap();
    let err = client.generate_report("prompt").await.unwrap_err();

    assert!(matches!(err, LlmError::InvalidReport(_)));
}
