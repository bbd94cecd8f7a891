//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, Gemini (via its OpenAI-compatible endpoint), Ollama,
//! and any endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Vendor-prefixed model ids (`gemini/gemini-2.0-flash`)
//! - Cached-prompt token accounting

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taor_core::error::ProviderError;
use taor_core::message::{Message, ToolCallEvent};
use taor_core::provider::*;
use tracing::{debug, warn};

use crate::{NOTICE_PREFIX, capabilities, http};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// An OpenAI-compatible LLM provider.
///
/// This handles most LLM vendors since many expose an OpenAI-compatible
/// `/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider. An empty key sends no auth header.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_tokens: capabilities::lookup(&model).max_output_tokens,
            model,
            temperature: None,
            client: http::client(),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key, model)
    }

    /// Create a Gemini provider through its OpenAI-compatible endpoint.
    pub fn gemini(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("gemini", GEMINI_BASE_URL, api_key, model)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        // Ollama doesn't need a key
        Self::new("ollama", base_url.unwrap_or(OLLAMA_BASE_URL), "", model)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The model id as the endpoint expects it, vendor prefix removed.
    pub fn wire_model(&self) -> &str {
        capabilities::strip_vendor_prefix(&self.model)
    }

    /// Convert neutral history to OpenAI API format, system prompt first.
    pub fn to_api_messages(system_prompt: &str, history: &[Message]) -> Vec<ApiMessage> {
        let mut result = Vec::with_capacity(history.len() + 1);

        if !system_prompt.is_empty() {
            result.push(ApiMessage::text("system", system_prompt));
        }

        for msg in history {
            let api_msg = match msg {
                Message::Assistant { text } if text.trim().is_empty() => continue,
                Message::User { text } => ApiMessage::text("user", text),
                Message::Assistant { text } => ApiMessage::text("assistant", text),
                Message::ToolCalls { text, calls } => ApiMessage {
                    role: "assistant".into(),
                    content: text.clone(),
                    tool_calls: Some(
                        calls
                            .iter()
                            .map(|call| ApiToolCall {
                                id: call.call_id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: call.tool_name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect(),
                    ),
                    tool_call_id: None,
                },
                Message::ToolResult {
                    call_id, content, ..
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(content.to_string()),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                },
                Message::Notice { text } => {
                    ApiMessage::text("user", &format!("{NOTICE_PREFIX}{text}"))
                }
            };
            result.push(api_msg);
        }

        result
    }

    /// Inverse of [`to_api_messages`](Self::to_api_messages). System messages are dropped.
    pub fn from_api_messages(messages: &[ApiMessage]) -> Vec<Message> {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut history = Vec::new();

        for msg in messages {
            match msg.role.as_str() {
                "system" => {}
                "assistant" => match &msg.tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        let calls = calls
                            .iter()
                            .map(|tc| {
                                names.insert(tc.id.clone(), tc.function.name.clone());
                                tc.to_event()
                            })
                            .collect();
                        history.push(Message::tool_calls(msg.content.clone(), calls));
                    }
                    _ => history.push(Message::assistant(msg.content.clone().unwrap_or_default())),
                },
                "tool" => {
                    let call_id = msg.tool_call_id.clone().unwrap_or_default();
                    let raw = msg.content.clone().unwrap_or_default();
                    let value = serde_json::from_str(&raw)
                        .unwrap_or(serde_json::Value::String(raw));
                    let name = names.get(&call_id).cloned().unwrap_or_default();
                    history.push(Message::tool_result(call_id, name, value));
                }
                _ => {
                    let text = msg.content.clone().unwrap_or_default();
                    history.push(match text.strip_prefix(NOTICE_PREFIX) {
                        Some(notice) => Message::notice(notice),
                        None => Message::user(text),
                    });
                }
            }
        }

        history
    }

    fn build_body(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.wire_model(),
            "messages": Self::to_api_messages(system_prompt, history),
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        if !tools.is_empty() {
            let api_tools: Vec<serde_json::Value> =
                tools.iter().map(|t| t.to_vendor(Vendor::OpenAi)).collect();
            body["tools"] = serde_json::json!(api_tools);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    fn response_to_agent_response(
        api_response: ApiResponse,
    ) -> std::result::Result<AgentResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .iter()
            .map(ApiToolCall::to_event)
            .collect();

        // prompt_tokens includes cached tokens; split them out so they are priced once.
        let usage = api_response.usage.map(|u| {
            let cached = u
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .unwrap_or(0);
            Usage {
                input_tokens: u.prompt_tokens.saturating_sub(cached),
                output_tokens: u.completion_tokens,
                cache_creation_tokens: 0,
                cache_read_tokens: cached,
            }
        });

        Ok(AgentResponse {
            text: choice.message.content.filter(|t| !t.is_empty()),
            tool_calls,
            usage,
            model: api_response.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> std::result::Result<AgentResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, tools, system_prompt);

        debug!(
            provider = %self.name,
            model = %self.wire_model(),
            messages = history.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(http::transport_error)?;

        if !response.status().is_success() {
            return Err(http::error_from_response(&self.name, response).await);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::response_to_agent_response(api_response)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    pub r#type: String,
    pub function: ApiFunction,
}

impl ApiToolCall {
    /// Arguments arrive JSON-encoded; an undecodable string is kept verbatim.
    fn to_event(&self) -> ToolCallEvent {
        let arguments = serde_json::from_str(&self.function.arguments).unwrap_or_else(|e| {
            warn!(tool = %self.function.name, error = %e, "Tool arguments are not valid JSON");
            serde_json::Value::String(self.function.arguments.clone())
        });
        ToolCallEvent::new(&self.id, &self.function.name, arguments)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_history() -> Vec<Message> {
        vec![
            Message::user("train a model"),
            Message::tool_calls(
                None,
                vec![
                    ToolCallEvent::new("call_a", "train_model", json!({"algorithm": "rf"})),
                    ToolCallEvent::new("call_b", "list_datasets", json!({})),
                ],
            ),
            Message::tool_result("call_a", "train_model", json!({"metrics": {"r2": 0.9}})),
            Message::tool_result("call_b", "list_datasets", json!({"error": "offline"})),
        ]
    }

    #[test]
    fn convenience_constructors() {
        let openai = OpenAiCompatProvider::openai("sk-test", "gpt-4o");
        assert_eq!(openai.name(), "openai");
        assert_eq!(openai.base_url, OPENAI_BASE_URL);
        assert_eq!(openai.max_tokens, 16_384);

        let ollama = OpenAiCompatProvider::ollama(None, "llama3.1");
        assert_eq!(ollama.name(), "ollama");
        assert!(ollama.api_key.is_empty());
        assert!(ollama.base_url.contains("11434"));
    }

    #[test]
    fn gemini_prefix_is_stripped_on_the_wire() {
        let gemini = OpenAiCompatProvider::gemini("g-key", "gemini/gemini-2.0-flash");
        assert_eq!(gemini.model(), "gemini/gemini-2.0-flash");
        assert_eq!(gemini.wire_model(), "gemini-2.0-flash");
        let body = gemini.build_body(&[Message::user("hi")], &[], "sys");
        assert_eq!(body["model"], "gemini-2.0-flash");
        assert_eq!(body["max_tokens"], 8192);
    }

    #[test]
    fn empty_assistant_text_is_skipped() {
        let history = vec![
            Message::user("hi"),
            Message::assistant(""),
            Message::user("again"),
        ];
        let msgs = OpenAiCompatProvider::to_api_messages("", &history);
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user"]);
    }

    #[test]
    fn system_prompt_goes_first() {
        let msgs = OpenAiCompatProvider::to_api_messages("Be brief", &[Message::user("Hello")]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[0].content.as_deref(), Some("Be brief"));
        assert_eq!(msgs[1].role, "user");

        let no_system = OpenAiCompatProvider::to_api_messages("", &[Message::user("Hello")]);
        assert_eq!(no_system.len(), 1);
    }

    #[test]
    fn tool_calls_have_json_encoded_arguments() {
        let msgs = OpenAiCompatProvider::to_api_messages("", &batch_history());
        let calls = msgs[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].r#type, "function");
        assert_eq!(calls[0].function.arguments, r#"{"algorithm":"rf"}"#);
        assert!(msgs[1].content.is_none());
    }

    #[test]
    fn tool_results_correlate_by_tool_call_id() {
        let msgs = OpenAiCompatProvider::to_api_messages("", &batch_history());
        assert_eq!(msgs[2].role, "tool");
        assert_eq!(msgs[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_b"));
        assert!(msgs[3].content.as_deref().unwrap().contains("offline"));
    }

    #[test]
    fn round_trip_preserves_call_result_correlation() {
        let mut history = batch_history();
        history.push(Message::notice("list_datasets keeps failing"));
        history.push(Message::assistant("Model trained."));
        let msgs = OpenAiCompatProvider::to_api_messages("sys", &history);
        let back = OpenAiCompatProvider::from_api_messages(&msgs);
        assert_eq!(back, history);
    }

    #[test]
    fn tool_definitions_use_function_shape() {
        let provider = OpenAiCompatProvider::openai("k", "gpt-4o");
        let defs = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate math".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = provider.build_body(&[], &defs, "");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
    }

    #[test]
    fn parse_response_with_parallel_tool_calls() {
        let api: ApiResponse = serde_json::from_value(json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "search_web", "arguments": "{\"q\":\"rust\"}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "get_page", "arguments": "{\"url\":\"x\"}"}}
                    ]
                }
            }],
            "usage": {
                "prompt_tokens": 120,
                "completion_tokens": 30,
                "total_tokens": 150,
                "prompt_tokens_details": {"cached_tokens": 100}
            }
        }))
        .unwrap();

        let resp = OpenAiCompatProvider::response_to_agent_response(api).unwrap();
        assert!(resp.text.is_none());
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].arguments["q"], "rust");
        assert_eq!(resp.tool_calls[1].call_id, "call_2");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.input_tokens, 20);
        assert_eq!(usage.cache_read_tokens, 100);
        assert_eq!(usage.output_tokens, 30);
    }

    #[test]
    fn malformed_arguments_are_kept_as_string() {
        let call = ApiToolCall {
            id: "c".into(),
            r#type: "function".into(),
            function: ApiFunction {
                name: "f".into(),
                arguments: "{not json".into(),
            },
        };
        assert_eq!(call.to_event().arguments, json!("{not json"));
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let api: ApiResponse =
            serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::response_to_agent_response(api),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
