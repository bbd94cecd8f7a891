//! Raw agent events: the low-level stream a turn produces.
//!
//! The agent core emits these while it runs; a presentation layer consumes
//! them and decides what a renderer sees. Events flow one way over an
//! unbounded channel so the loop never waits on its observer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::TurnOutcome;
use crate::approval::ApprovalRequest;
use crate::message::ToolCallEvent;
use crate::provider::Usage;

/// Everything observable about one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A new user turn began.
    TurnStarted,

    /// Partial assistant text.
    TextDelta { text: String },

    /// The model requested a tool; execution is about to start.
    ToolCallStarted { call: ToolCallEvent },

    /// A tool call completed (successfully or not).
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        /// The full structured result.
        result: serde_json::Value,
        /// Set when the result was offloaded to the result store.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stored_id: Option<String>,
        duration_ms: u64,
    },

    /// An approval-gated tool is waiting for a human decision.
    ApprovalRequested { request: ApprovalRequest },

    /// Loop-level guidance (e.g. a doom-loop warning was injected).
    Notice { message: String },

    /// The turn reached a terminal state.
    TurnCompleted {
        outcome: TurnOutcome,
        text: String,
        usage: Usage,
        /// Estimated USD cost of this turn, when the model is priced.
        cost: Option<f64>,
        iterations: u32,
    },

    /// The turn was aborted by an unrecoverable backend error. Tokens
    /// spent before the failure are still reported.
    TurnFailed {
        message: String,
        usage: Usage,
        cost: Option<f64>,
    },
}

impl AgentEvent {
    /// Short event name, used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted => "turn_started",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::Notice { .. } => "notice",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::TurnFailed { .. } => "turn_failed",
        }
    }
}

/// Sending half of a turn's event stream.
///
/// Emitting never blocks and never fails: once the observer is gone,
/// events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    /// Create a connected sink and its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.sender {
            // Ignore send errors (observer dropped = that's fine)
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(AgentEvent::TurnStarted);
        sink.emit(AgentEvent::TextDelta { text: "hi".into() });

        assert_eq!(rx.recv().await.unwrap(), AgentEvent::TurnStarted);
        assert_eq!(
            rx.recv().await.unwrap(),
            AgentEvent::TextDelta { text: "hi".into() }
        );
    }

    #[test]
    fn emitting_after_receiver_dropped_doesnt_panic() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(AgentEvent::TurnStarted);
        EventSink::discard().emit(AgentEvent::TurnStarted);
    }

    #[test]
    fn event_serialization_uses_type_tag() {
        let event = AgentEvent::TextDelta { text: "Hello".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text_delta""#));
        assert_eq!(event.event_type(), "text_delta");
    }
}
