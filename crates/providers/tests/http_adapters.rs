//! Adapter behavior against a mock HTTP backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taor_core::error::ProviderError;
use taor_core::message::{Message, ToolCallEvent};
use taor_core::provider::{Provider, ToolDefinition};
use taor_providers::{AnthropicProvider, OpenAiCompatProvider, RetryPolicy, RetryingProvider};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

fn anthropic_ok() -> serde_json::Value {
    json!({
        "id": "msg_1",
        "model": "claude-sonnet-4-20250514",
        "content": [{"type": "text", "text": "All good."}],
        "usage": {"input_tokens": 12, "output_tokens": 3, "cache_read_input_tokens": 8}
    })
}

fn search_tool() -> ToolDefinition {
    ToolDefinition {
        name: "search_materials".into(),
        description: "Search the materials database".into(),
        parameters: json!({"type": "object", "properties": {"formula": {"type": "string"}}}),
    }
}

#[tokio::test]
async fn anthropic_sends_native_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_ok()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("sk-ant-test", "claude-sonnet-4-20250514")
        .with_base_url(server.uri());

    let history = vec![
        Message::user("find NaCl"),
        Message::tool_calls(
            None,
            vec![ToolCallEvent::new("toolu_1", "search_materials", json!({"formula": "NaCl"}))],
        ),
        Message::tool_result("toolu_1", "search_materials", json!({"results": [1]})),
    ];
    let resp = provider
        .complete(&history, &[search_tool()], "You are helpful")
        .await
        .unwrap();
    assert_eq!(resp.text.as_deref(), Some("All good."));
    assert_eq!(resp.usage.unwrap().cache_read_tokens, 8);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "claude-sonnet-4-20250514");
    assert_eq!(body["system"][0]["text"], "You are helpful");
    assert_eq!(body["tools"][0]["name"], "search_materials");
    assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
    assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
}

#[tokio::test]
async fn retrying_wrapper_recovers_from_503() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_ok()))
        .expect(1)
        .mount(&server)
        .await;

    let inner = Arc::new(AnthropicProvider::new("k", "claude-sonnet-4").with_base_url(server.uri()));
    let provider = RetryingProvider::new(inner, fast_retries(3));

    let resp = provider.complete(&[Message::user("hi")], &[], "").await.unwrap();
    assert_eq!(resp.text.as_deref(), Some("All good."));
}

#[tokio::test]
async fn rate_limit_honors_retry_after_and_respects_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_string("slow down"),
        )
        .expect(3)
        .mount(&server)
        .await;

    let inner = Arc::new(OpenAiCompatProvider::new("openai", server.uri(), "sk", "gpt-4o"));
    let provider = RetryingProvider::new(inner, fast_retries(2));

    let err = provider.complete(&[Message::user("hi")], &[], "").await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            retry_after: Some(d)
        } if d.is_zero()
    ));
}

#[tokio::test]
async fn unauthorized_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let inner = Arc::new(OpenAiCompatProvider::new("openai", server.uri(), "sk", "gpt-4o"));
    let provider = RetryingProvider::new(inner, fast_retries(3));

    let err = provider.complete(&[Message::user("hi")], &[], "").await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn openai_compat_parses_tool_calls_and_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "choices": [{"message": {
                "role": "assistant",
                "content": "Searching.",
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "search_materials", "arguments": "{\"formula\":\"Fe2O3\"}"}
                }]
            }}],
            "usage": {"prompt_tokens": 50, "completion_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new("openai", server.uri(), "sk-test", "gpt-4o");
    let resp = provider
        .complete(&[Message::user("rust oxide?")], &[search_tool()], "sys")
        .await
        .unwrap();

    assert_eq!(resp.text.as_deref(), Some("Searching."));
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].call_id, "call_9");
    assert_eq!(resp.tool_calls[0].arguments["formula"], "Fe2O3");
    assert_eq!(resp.usage.unwrap().input_tokens, 50);

    let body: serde_json::Value = server.received_requests().await.unwrap()[0]
        .body_json()
        .unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["tools"][0]["function"]["name"], "search_materials");
}

#[tokio::test]
async fn ollama_sends_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1",
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        })))
        .mount(&server)
        .await;

    let base = format!("{}/v1", server.uri());
    let provider = OpenAiCompatProvider::ollama(Some(&base), "llama3.1");
    let resp = provider.complete(&[Message::user("hi")], &[], "").await.unwrap();
    assert!(resp.usage.is_none());

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}
