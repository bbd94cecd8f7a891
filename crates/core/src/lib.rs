//! # TAOR Core
//!
//! Domain types, traits, and error definitions for the TAOR
//! (Think-Act-Observe-Repeat) agent-orchestration core.
//! This crate has **no transport or vendor dependencies**; it defines the
//! neutral model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here; implementations live in their own crates:
//! - `Provider`: LLM backends (`taor-providers`)
//! - `Tool`: capabilities the model may invoke (`taor-tools` and callers)
//! - `ApprovalGate`: human-in-the-loop decisions
//! - `SessionStore`: conversation persistence (`taor-server`)

pub mod agent;
pub mod approval;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentSettings, ApprovalPolicy, CancelFlag, TurnOutcome};
pub use approval::{ApprovalBroker, ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprove};
pub use error::{Error, Result};
pub use event::{AgentEvent, EventSink};
pub use message::{Conversation, ConversationId, Message, ToolCallEvent, is_error_result};
pub use provider::{AgentResponse, Provider, ToolDefinition, Usage, Vendor};
pub use session::SessionStore;
pub use tool::{FunctionTool, Tool, ToolRegistry};
