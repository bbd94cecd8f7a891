//! Notifications the backend pushes to a renderer.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use taor_core::agent::TurnOutcome;

use crate::cards::Card;
use crate::envelope::{JSONRPC_VERSION, Notification};
use crate::error::ProtocolError;

/// What a pending prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Run an approval-gated tool?
    Approval,
    /// Go ahead with the plan the model proposed?
    PlanConfirmation,
}

/// A question for the human, answered with `prompt/answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_id: String,
    pub kind: PromptKind,
    pub message: String,
    /// Suggested answers
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Running cost after a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostUpdate {
    /// This turn's cost in USD; null when the model is not priced
    pub turn_cost: Option<f64>,
    /// Session total in USD
    pub session_cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

/// Every notification in the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ServerNotification {
    #[serde(rename = "turn/started")]
    TurnStarted {},

    #[serde(rename = "text/delta")]
    TextDelta { text: String },

    #[serde(rename = "plan/card")]
    PlanCard { plan: String },

    #[serde(rename = "prompt/show")]
    PromptShow(Prompt),

    #[serde(rename = "tool/started")]
    ToolStarted {
        call_id: String,
        tool_name: String,
        /// Short progress phrase, e.g. "Searching materials"
        verb: String,
        arguments: Value,
    },

    #[serde(rename = "tool/result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        card: Card,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stored_id: Option<String>,
        duration_ms: u64,
    },

    #[serde(rename = "notice")]
    Notice { message: String },

    #[serde(rename = "cost/update")]
    CostUpdate(CostUpdate),

    #[serde(rename = "turn/completed")]
    TurnCompleted {
        outcome: TurnOutcome,
        text: String,
        iterations: u32,
    },

    #[serde(rename = "turn/failed")]
    TurnFailed { message: String },
}

impl ServerNotification {
    pub fn method(&self) -> &'static str {
        match self {
            Self::TurnStarted {} => "turn/started",
            Self::TextDelta { .. } => "text/delta",
            Self::PlanCard { .. } => "plan/card",
            Self::PromptShow(_) => "prompt/show",
            Self::ToolStarted { .. } => "tool/started",
            Self::ToolResult { .. } => "tool/result",
            Self::Notice { .. } => "notice",
            Self::CostUpdate(_) => "cost/update",
            Self::TurnCompleted { .. } => "turn/completed",
            Self::TurnFailed { .. } => "turn/failed",
        }
    }

    /// Serialize as one protocol line (no trailing newline).
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        }
        Ok(value.to_string())
    }
}

impl TryFrom<Notification> for ServerNotification {
    type Error = ProtocolError;

    fn try_from(notification: Notification) -> Result<Self, Self::Error> {
        let method = notification.method.clone();
        serde_json::from_value(json!({
            "method": notification.method,
            "params": notification.params,
        }))
        .map_err(|e| ProtocolError::InvalidParams(format!("{method}: {e}")))
    }
}
