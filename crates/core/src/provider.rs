//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider takes the neutral conversation history, the available tool
//! definitions and a system prompt, and returns one [`AgentResponse`].
//! Every vendor-specific shape stays inside the adapter that produced it.
//!
//! Implementations: Anthropic, OpenAI-compatible (OpenAI, Gemini, Ollama).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, ToolCallEvent};

/// Vendor wire formats a tool definition can be projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    /// `tool_use` / `tool_result` content blocks
    Anthropic,
    /// `tool_calls` function array (also used by OpenAI-compatible endpoints)
    OpenAi,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Project this definition into a vendor's tool-definition shape.
    pub fn to_vendor(&self, vendor: Vendor) -> serde_json::Value {
        match vendor {
            Vendor::Anthropic => serde_json::json!({
                "name": self.name,
                "description": self.description,
                "input_schema": self.parameters,
            }),
            Vendor::OpenAi => serde_json::json!({
                "type": "function",
                "function": {
                    "name": self.name,
                    "description": self.description,
                    "parameters": self.parameters,
                }
            }),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_creation_tokens += rhs.cache_creation_tokens;
        self.cache_read_tokens += rhs.cache_read_tokens;
    }
}

/// One backend round-trip, normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Text produced by the model, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Tool calls in the order the model emitted them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallEvent>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

impl AgentResponse {
    /// A text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A response requesting tools.
    pub fn with_tool_calls(tool_calls: Vec<ToolCallEvent>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls
/// `complete()` without knowing which vendor is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// The model id requests are sent with.
    fn model(&self) -> &str;

    /// Send the history and get one normalized response.
    async fn complete(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
        system_prompt: &str,
    ) -> std::result::Result<AgentResponse, ProviderError>;
}
