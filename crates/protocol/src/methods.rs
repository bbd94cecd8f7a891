//! Requests a renderer may send, with their typed params and results.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use taor_core::agent::ApprovalPolicy;

use crate::error::ProtocolError;

pub const INITIALIZE: &str = "initialize";
pub const MESSAGE_SEND: &str = "message/send";
pub const COMMAND_SEND: &str = "command/send";
pub const PROMPT_ANSWER: &str = "prompt/answer";
pub const SESSION_LOAD: &str = "session/load";
pub const SHUTDOWN: &str = "shutdown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Backend name; the server's configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub approval_policy: ApprovalPolicy,

    /// Id of a saved session to continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    pub protocol_version: u32,
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub approval_policy: ApprovalPolicy,
    pub tools: Vec<String>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSendParams {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptAnswerParams {
    pub prompt_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLoadParams {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLoadResult {
    pub session_id: String,
    pub message_count: usize,
}

/// A request with its method resolved and params validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Initialize(InitializeParams),
    MessageSend(MessageSendParams),
    CommandSend(CommandSendParams),
    PromptAnswer(PromptAnswerParams),
    SessionLoad(SessionLoadParams),
    Shutdown,
}

impl ClientRequest {
    /// Resolve a method name and its raw params.
    ///
    /// Unknown methods fail with [`ProtocolError::MethodNotFound`]; params
    /// that do not match the method's shape with
    /// [`ProtocolError::InvalidParams`].
    pub fn parse(method: &str, params: Value) -> Result<Self, ProtocolError> {
        match method {
            INITIALIZE => params_of(params).map(Self::Initialize),
            MESSAGE_SEND => params_of(params).map(Self::MessageSend),
            COMMAND_SEND => params_of(params).map(Self::CommandSend),
            PROMPT_ANSWER => params_of(params).map(Self::PromptAnswer),
            SESSION_LOAD => params_of(params).map(Self::SessionLoad),
            SHUTDOWN => Ok(Self::Shutdown),
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Initialize(_) => INITIALIZE,
            Self::MessageSend(_) => MESSAGE_SEND,
            Self::CommandSend(_) => COMMAND_SEND,
            Self::PromptAnswer(_) => PROMPT_ANSWER,
            Self::SessionLoad(_) => SESSION_LOAD,
            Self::Shutdown => SHUTDOWN,
        }
    }

    /// Params as they go on the wire.
    pub fn params(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            Self::Initialize(p) => serde_json::to_value(p)?,
            Self::MessageSend(p) => serde_json::to_value(p)?,
            Self::CommandSend(p) => serde_json::to_value(p)?,
            Self::PromptAnswer(p) => serde_json::to_value(p)?,
            Self::SessionLoad(p) => serde_json::to_value(p)?,
            Self::Shutdown => Value::Null,
        };
        Ok(value)
    }
}

fn params_of<T: DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
}

/// Slash commands accepted by `command/send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop the running turn after its current iteration
    Cancel,
    /// Start a fresh conversation
    Clear,
    /// Report the session's running cost
    Cost,
    /// List registered tools
    Tools,
    /// Persist the conversation
    Save,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Cancel,
        Command::Clear,
        Command::Cost,
        Command::Tools,
        Command::Save,
    ];

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "/cancel" => Some(Self::Cancel),
            "/clear" => Some(Self::Clear),
            "/cost" => Some(Self::Cost),
            "/tools" => Some(Self::Tools),
            "/save" => Some(Self::Save),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "/cancel",
            Self::Clear => "/clear",
            Self::Cost => "/cost",
            Self::Tools => "/tools",
            Self::Save => "/save",
        }
    }
}
