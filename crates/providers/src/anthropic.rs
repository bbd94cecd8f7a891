//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Prompt caching via `cache_control` on the system block and last tool

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taor_core::error::ProviderError;
use taor_core::message::{Message, ToolCallEvent, is_error_result};
use taor_core::provider::*;
use tracing::debug;

use crate::{NOTICE_PREFIX, capabilities, http};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    prompt_cache: bool,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider for `model`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            max_tokens: capabilities::lookup(&model).max_output_tokens,
            model,
            prompt_cache: true,
            temperature: None,
            client: http::client(),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Toggle `cache_control` annotations.
    pub fn with_prompt_cache(mut self, enabled: bool) -> Self {
        self.prompt_cache = enabled;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Convert neutral history to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results (and any notice that follows them) share a
    /// single user message, which is how the API expects a batch answered.
    pub fn to_api_messages(history: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in history {
            match msg {
                Message::User { text } => {
                    push_user_block(&mut result, ContentBlock::Text { text: text.clone() });
                }
                // Empty content is rejected on non-final assistant turns.
                Message::Assistant { text } if text.trim().is_empty() => {}
                Message::Assistant { text } => {
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Text(text.clone()),
                    });
                }
                Message::ToolCalls { text, calls } => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if let Some(text) = text.as_ref().filter(|t| !t.is_empty()) {
                        blocks.push(ContentBlock::Text { text: text.clone() });
                    }
                    for call in calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: call.call_id.clone(),
                            name: call.tool_name.clone(),
                            input: call.arguments.clone(),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Message::ToolResult {
                    call_id, content, ..
                } => {
                    push_user_block(
                        &mut result,
                        ContentBlock::ToolResult {
                            tool_use_id: call_id.clone(),
                            content: content.to_string(),
                            is_error: is_error_result(content).then_some(true),
                        },
                    );
                }
                Message::Notice { text } => {
                    push_user_block(
                        &mut result,
                        ContentBlock::Text {
                            text: format!("{NOTICE_PREFIX}{text}"),
                        },
                    );
                }
            }
        }

        result
    }

    /// Inverse of [`to_api_messages`](Self::to_api_messages).
    ///
    /// Tool names for results are recovered from the `tool_use` block with
    /// the matching id.
    pub fn from_api_messages(messages: &[AnthropicMessage]) -> Vec<Message> {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut history = Vec::new();

        for msg in messages {
            match (msg.role.as_str(), &msg.content) {
                ("assistant", AnthropicContent::Text(text)) => {
                    history.push(Message::assistant(text.clone()));
                }
                ("assistant", AnthropicContent::Blocks(blocks)) => {
                    let mut text: Option<String> = None;
                    let mut calls = Vec::new();
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text: t } => text = Some(t.clone()),
                            ContentBlock::ToolUse { id, name, input } => {
                                names.insert(id.clone(), name.clone());
                                calls.push(ToolCallEvent::new(id, name, input.clone()));
                            }
                            ContentBlock::ToolResult { .. } => {}
                        }
                    }
                    if calls.is_empty() {
                        history.push(Message::assistant(text.unwrap_or_default()));
                    } else {
                        history.push(Message::tool_calls(text, calls));
                    }
                }
                (_, AnthropicContent::Text(text)) => history.push(user_text(text)),
                (_, AnthropicContent::Blocks(blocks)) => {
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => history.push(user_text(text)),
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } => {
                                let value = serde_json::from_str(content)
                                    .unwrap_or_else(|_| serde_json::Value::String(content.clone()));
                                let name = names.get(tool_use_id).cloned().unwrap_or_default();
                                history.push(Message::tool_result(tool_use_id, name, value));
                            }
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                }
            }
        }

        history
    }

    /// Tool definitions, with the last one marked as a cache breakpoint.
    fn to_api_tools(&self, tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        let mut api_tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| t.to_vendor(Vendor::Anthropic))
            .collect();
        if self.prompt_cache {
            if let Some(last) = api_tools.last_mut() {
                last["cache_control"] = serde_json::json!({"type": "ephemeral"});
            }
        }
        api_tools
    }

    fn system_field(&self, system_prompt: &str) -> serde_json::Value {
        if self.prompt_cache {
            serde_json::json!([{
                "type": "text",
                "text": system_prompt,
                "cache_control": {"type": "ephemeral"},
            }])
        } else {
            serde_json::json!(system_prompt)
        }
    }

    fn build_body(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(history),
            "max_tokens": self.max_tokens,
        });

        if !system_prompt.is_empty() {
            body["system"] = self.system_field(system_prompt);
        }
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(self.to_api_tools(tools));
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    /// Convert Anthropic API response to the neutral response.
    fn response_to_agent_response(resp: AnthropicResponse) -> AgentResponse {
        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => text_parts.push(text),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCallEvent::new(id, name, input));
                }
                ResponseContentBlock::Other => {}
            }
        }

        let text = Some(text_parts.join("\n")).filter(|t| !t.is_empty());
        let usage = Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            cache_creation_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
        };

        AgentResponse {
            text,
            tool_calls,
            usage: Some(usage),
            model: resp.model,
        }
    }
}

fn push_user_block(result: &mut Vec<AnthropicMessage>, block: ContentBlock) {
    if let Some(last) = result.last_mut().filter(|m| m.role == "user") {
        let mut blocks =
            match std::mem::replace(&mut last.content, AnthropicContent::Blocks(Vec::new())) {
                AnthropicContent::Text(text) => vec![ContentBlock::Text { text }],
                AnthropicContent::Blocks(blocks) => blocks,
            };
        blocks.push(block);
        last.content = AnthropicContent::Blocks(blocks);
        return;
    }

    let content = match block {
        ContentBlock::Text { text } => AnthropicContent::Text(text),
        other => AnthropicContent::Blocks(vec![other]),
    };
    result.push(AnthropicMessage {
        role: "user".into(),
        content,
    });
}

fn user_text(text: &str) -> Message {
    match text.strip_prefix(NOTICE_PREFIX) {
        Some(notice) => Message::notice(notice),
        None => Message::user(text),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(history, tools, system_prompt);

        debug!(
            provider = "anthropic",
            model = %self.model,
            messages = history.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        if !response.status().is_success() {
            return Err(http::error_from_response(&self.name, response).await);
        }

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(Self::response_to_agent_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Thinking and any future block types.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}
