//! Message and Conversation domain types.
//!
//! These are the neutral value objects every backend adapter translates
//! to and from. No vendor shape ever appears here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    /// Correlation token, unique within one turn
    pub call_id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments as a structured value
    pub arguments: serde_json::Value,
}

impl ToolCallEvent {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Text typed by the user
    User { text: String },

    /// Final assistant text for an iteration with no tool calls
    Assistant { text: String },

    /// An assistant turn that requested one or more tools
    ToolCalls {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCallEvent>,
    },

    /// The structured result of one tool call
    ToolResult {
        call_id: String,
        tool_name: String,
        content: serde_json::Value,
    },

    /// Loop-injected guidance visible to the model (e.g. doom-loop warnings)
    Notice { text: String },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into() }
    }

    pub fn tool_calls(text: Option<String>, calls: Vec<ToolCallEvent>) -> Self {
        Self::ToolCalls { text, calls }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content,
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice { text: text.into() }
    }

    /// Rough size of the textual payload, used for token estimates.
    fn text_len(&self) -> usize {
        match self {
            Self::User { text } | Self::Assistant { text } | Self::Notice { text } => text.len(),
            Self::ToolCalls { text, calls } => {
                text.as_deref().map_or(0, str::len)
                    + calls
                        .iter()
                        .map(|c| c.tool_name.len() + c.arguments.to_string().len())
                        .sum::<usize>()
            }
            Self::ToolResult { content, .. } => content.to_string().len(),
        }
    }
}

/// Whether a structured tool result signals failure.
///
/// The tool contract is that failure is an object carrying an `error` key.
pub fn is_error_result(content: &serde_json::Value) -> bool {
    content
        .as_object()
        .is_some_and(|map| map.contains_key("error"))
}

/// A conversation is an ordered, append-only sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.text_len() / 4).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
