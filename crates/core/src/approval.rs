//! Human-in-the-loop approval as a request/response handshake.
//!
//! The execution side asks an [`ApprovalGate`] for a decision and awaits
//! it. [`ApprovalBroker`] keeps a pending-request table keyed by generated
//! id; whoever owns the UI answers with [`ApprovalBroker::resolve`], which
//! never blocks. The same handshake works across tasks, threads, or a
//! process boundary (the id travels over the wire).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{AgentEvent, EventSink};
use crate::message::ToolCallEvent;

/// A pending decision about one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Generated id the answer must quote
    pub id: String,
    pub call: ToolCallEvent,
}

impl ApprovalRequest {
    pub fn new(call: ToolCallEvent) -> Self {
        Self {
            id: format!("approval-{}", Uuid::new_v4().simple()),
            call,
        }
    }
}

/// The human's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
    /// Approve this call and every later call of the same tool.
    AlwaysApprove,
}

impl ApprovalDecision {
    /// Parse a free-form answer ("y", "no", "always", ...).
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "approve" | "ok" => Some(Self::Approve),
            "n" | "no" | "deny" => Some(Self::Deny),
            "a" | "always" | "always_approve" => Some(Self::AlwaysApprove),
            _ => None,
        }
    }

    pub fn is_approved(self) -> bool {
        !matches!(self, Self::Deny)
    }
}

/// Source of approval decisions.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Announce `request` on `events` and wait for the decision.
    async fn decide(&self, request: ApprovalRequest, events: &EventSink) -> ApprovalDecision;
}

/// Approves everything without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn decide(&self, _request: ApprovalRequest, _events: &EventSink) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}

/// Pending-request table bridging the execution task and the UI.
#[derive(Debug, Default)]
pub struct ApprovalBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<ApprovalDecision>>>,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a decision. Returns false if no request with `id` is waiting.
    pub fn resolve(&self, id: &str, decision: ApprovalDecision) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id);
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => {
                warn!(approval_id = %id, "No pending approval with this id");
                false
            }
        }
    }

    /// Deny every outstanding request (used on shutdown/cancel).
    pub fn deny_all(&self) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .collect();
        for (_, tx) in drained {
            let _ = tx.send(ApprovalDecision::Deny);
        }
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ApprovalGate for ApprovalBroker {
    async fn decide(&self, request: ApprovalRequest, events: &EventSink) -> ApprovalDecision {
        let (tx, rx) = oneshot::channel();
        // Register before announcing so an immediate answer can't race us.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(request.id.clone(), tx);

        debug!(approval_id = %request.id, tool = %request.call.tool_name, "Awaiting approval");
        events.emit(AgentEvent::ApprovalRequested { request });

        // A dropped sender means nobody will ever answer: treat as denial.
        rx.await.unwrap_or(ApprovalDecision::Deny)
    }
}
