//! `UiEmitter`: raw agent events in, protocol notifications out.

use taor_core::event::AgentEvent;
use taor_core::provider::Usage;
use taor_protocol::{CostUpdate, Prompt, PromptKind, ServerNotification};
use tracing::debug;
use uuid::Uuid;

use crate::classify::classify;
use crate::plan::{PlanDetector, Segment};
use crate::verbs::verb_for;

/// Answers offered for an approval prompt.
pub const APPROVAL_OPTIONS: [&str; 3] = ["yes", "no", "always"];

/// Answers offered for a plan confirmation.
pub const PLAN_OPTIONS: [&str; 2] = ["yes", "no"];

/// Turns one session's event stream into notifications.
///
/// Pure apart from its own state: the plan detector's buffers and the
/// running session cost, both of which carry across turns.
#[derive(Debug, Default)]
pub struct UiEmitter {
    plan: PlanDetector,
    session_cost: f64,
    session_usage: Usage,
}

impl UiEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running session cost in USD.
    pub fn session_cost(&self) -> f64 {
        self.session_cost
    }

    pub fn session_usage(&self) -> Usage {
        self.session_usage
    }

    pub fn handle(&mut self, event: AgentEvent) -> Vec<ServerNotification> {
        debug!(event = event.event_type(), "Emitting");
        match event {
            AgentEvent::TurnStarted => vec![ServerNotification::TurnStarted {}],

            AgentEvent::TextDelta { text } => {
                let segments = self.plan.push(&text);
                self.render(segments)
            }

            AgentEvent::ToolCallStarted { call } => {
                let mut out = self.render_flush();
                out.push(ServerNotification::ToolStarted {
                    verb: verb_for(&call.tool_name),
                    call_id: call.call_id,
                    tool_name: call.tool_name,
                    arguments: call.arguments,
                });
                out
            }

            AgentEvent::ToolCallFinished {
                call_id,
                tool_name,
                result,
                stored_id,
                duration_ms,
            } => vec![ServerNotification::ToolResult {
                card: classify(&result),
                call_id,
                tool_name,
                stored_id,
                duration_ms,
            }],

            AgentEvent::ApprovalRequested { request } => {
                let mut out = self.render_flush();
                out.push(ServerNotification::PromptShow(Prompt {
                    message: format!("Allow '{}' to run?", request.call.tool_name),
                    prompt_id: request.id,
                    kind: PromptKind::Approval,
                    options: APPROVAL_OPTIONS.iter().map(|s| s.to_string()).collect(),
                    tool_name: Some(request.call.tool_name),
                    arguments: Some(request.call.arguments),
                }));
                out
            }

            AgentEvent::Notice { message } => vec![ServerNotification::Notice { message }],

            AgentEvent::TurnCompleted {
                outcome,
                text,
                usage,
                cost,
                iterations,
            } => {
                let segments = self.plan.finish();
                let mut out = self.render(segments);
                out.push(self.accrue(usage, cost));
                out.push(ServerNotification::TurnCompleted {
                    outcome,
                    text,
                    iterations,
                });
                out
            }

            AgentEvent::TurnFailed {
                message,
                usage,
                cost,
            } => {
                let segments = self.plan.finish();
                let mut out = self.render(segments);
                out.push(self.accrue(usage, cost));
                out.push(ServerNotification::TurnFailed { message });
                out
            }
        }
    }

    fn accrue(&mut self, usage: Usage, cost: Option<f64>) -> ServerNotification {
        let turn_cost = cost.filter(|c| c.is_finite() && *c >= 0.0);
        if let Some(c) = turn_cost {
            self.session_cost += c;
        }
        self.session_usage += usage;
        ServerNotification::CostUpdate(CostUpdate {
            turn_cost,
            session_cost: self.session_cost,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_tokens,
            cache_creation_tokens: usage.cache_creation_tokens,
        })
    }

    fn render_flush(&mut self) -> Vec<ServerNotification> {
        let segments = self.plan.flush_text();
        self.render(segments)
    }

    fn render(&self, segments: Vec<Segment>) -> Vec<ServerNotification> {
        let mut out = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push(ServerNotification::TextDelta { text }),
                Segment::Plan(plan) => {
                    out.push(ServerNotification::PlanCard { plan });
                    out.push(ServerNotification::PromptShow(Prompt {
                        prompt_id: format!("plan-{}", Uuid::new_v4()),
                        kind: PromptKind::PlanConfirmation,
                        message: "Proceed with this plan?".into(),
                        options: PLAN_OPTIONS.iter().map(|s| s.to_string()).collect(),
                        tool_name: None,
                        arguments: None,
                    }));
                }
            }
        }
        out
    }
}
