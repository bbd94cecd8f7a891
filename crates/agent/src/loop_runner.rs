//! The agent reasoning loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use taor_core::agent::{AgentSettings, ApprovalPolicy, CancelFlag, TurnOutcome};
use taor_core::approval::{ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprove};
use taor_core::event::{AgentEvent, EventSink};
use taor_core::message::{Conversation, Message, ToolCallEvent, is_error_result};
use taor_core::provider::{Provider, Usage};
use taor_core::tool::ToolRegistry;
use taor_telemetry::{PricingTable, SessionCost};
use taor_tools::{PEEK_TOOL_NAME, ResultStore};
use tracing::{debug, info, warn};

use crate::doom_loop::DoomLoopGuard;

/// Result substituted for a call the user refused.
pub const DENIED_RESULT: &str = "denied by user";

/// Owns one session's history and drives the Think-Act-Observe-Repeat cycle.
pub struct AgentCore {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry, shared immutably
    tools: Arc<ToolRegistry>,

    /// Where oversized results go
    store: Arc<ResultStore>,

    /// Source of approval decisions for gated tools
    gate: Arc<dyn ApprovalGate>,

    /// Model prices for per-turn cost
    pricing: Arc<PricingTable>,

    settings: AgentSettings,
    conversation: Conversation,
    doom_guard: DoomLoopGuard,

    /// Tools the user chose to always approve this session
    always_approved: HashSet<String>,

    session_cost: SessionCost,
}

impl AgentCore {
    /// Create a new agent core with default settings.
    ///
    /// Until a gate is attached with [`with_approval_gate`](Self::with_approval_gate),
    /// gated tools run without asking.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            gate: Arc::new(AutoApprove),
            pricing: Arc::new(PricingTable::with_defaults()),
            settings: AgentSettings::default(),
            conversation: Conversation::new(),
            doom_guard: DoomLoopGuard::default(),
            always_approved: HashSet::new(),
            session_cost: SessionCost::new(),
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Set the maximum number of backend calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn set_approval_policy(&mut self, policy: ApprovalPolicy) {
        self.settings.approval = policy;
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn history(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session_cost(&self) -> &SessionCost {
        &self.session_cost
    }

    /// Replace the history with a previously saved conversation.
    pub fn restore(&mut self, conversation: Conversation) {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Restored conversation"
        );
        self.conversation = conversation;
        self.doom_guard.reset();
    }

    /// Start over with an empty history. Session cost is kept.
    pub fn clear(&mut self) {
        self.conversation = Conversation::new();
        self.doom_guard.reset();
        self.always_approved.clear();
    }

    /// Process one user message until the model answers, the iteration
    /// limit is hit, or cancellation is observed.
    ///
    /// Each iteration:
    /// 1. Checks the cancel flag
    /// 2. Calls the LLM with the full history
    /// 3. If tool calls are returned, executes them and loops
    /// 4. Otherwise records the final text and returns
    pub async fn run_turn(
        &mut self,
        user_text: &str,
        events: &EventSink,
        cancel: &CancelFlag,
    ) -> taor_core::Result<TurnOutcome> {
        info!(
            conversation_id = %self.conversation.id,
            messages = self.conversation.messages.len(),
            provider = %self.provider.name(),
            "Processing turn"
        );

        self.conversation.push(Message::user(user_text));
        events.emit(AgentEvent::TurnStarted);

        let tool_definitions = self.tools.definitions();
        let mut usage = Usage::default();
        let mut model = self.provider.model().to_string();
        let mut iteration: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(conversation_id = %self.conversation.id, iteration, "Turn cancelled");
                return Ok(self.finish(TurnOutcome::Cancelled, String::new(), usage, &model, iteration, events));
            }

            if iteration >= self.settings.max_iterations {
                warn!(
                    conversation_id = %self.conversation.id,
                    iterations = iteration,
                    "Max iterations reached, stopping turn"
                );
                let text = format!(
                    "Stopped after reaching the maximum of {} iterations without a final answer. \
                     Send another message to continue.",
                    self.settings.max_iterations
                );
                self.conversation.push(Message::assistant(&text));
                return Ok(self.finish(TurnOutcome::MaxIterations, text, usage, &model, iteration, events));
            }

            iteration += 1;
            debug!(conversation_id = %self.conversation.id, iteration, "Agent loop iteration");

            let response = match self
                .provider
                .complete(
                    &self.conversation.messages,
                    &tool_definitions,
                    &self.settings.system_prompt,
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, iteration, "Backend call failed, aborting turn");
                    let cost = self.pricing.compute_cost(&model, &usage);
                    self.session_cost.record(usage, cost);
                    events.emit(AgentEvent::TurnFailed {
                        message: e.to_string(),
                        usage,
                        cost,
                    });
                    return Err(e.into());
                }
            };

            if let Some(u) = response.usage {
                usage += u;
            }
            if !response.model.is_empty() {
                model = response.model.clone();
            }
            if let Some(text) = response.text.as_ref().filter(|t| !t.is_empty()) {
                events.emit(AgentEvent::TextDelta { text: text.clone() });
            }

            if response.tool_calls.is_empty() {
                let text = response.text.unwrap_or_default();
                self.conversation.push(Message::assistant(&text));
                return Ok(self.finish(TurnOutcome::Done, text, usage, &model, iteration, events));
            }

            debug!(tool_count = response.tool_calls.len(), "Executing tool calls");
            let calls = response.tool_calls.clone();
            self.conversation
                .push(Message::tool_calls(response.text, response.tool_calls));

            let mut notices = Vec::new();
            for call in &calls {
                if let Some(notice) = self.act(call, events).await {
                    notices.push(notice);
                }
            }
            for notice in notices {
                warn!(conversation_id = %self.conversation.id, "Doom loop detected, injecting notice");
                self.conversation.push(Message::notice(&notice));
                events.emit(AgentEvent::Notice { message: notice });
            }

            // Loop back; the LLM will see the tool results and decide what to do next
        }
    }

    /// Run one tool call through approval, execution, the doom-loop guard
    /// and offload. Returns a notice when the guard fires.
    async fn act(&mut self, call: &ToolCallEvent, events: &EventSink) -> Option<String> {
        events.emit(AgentEvent::ToolCallStarted { call: call.clone() });
        let start = Instant::now();

        let result = if self.needs_approval(&call.tool_name) {
            let decision = self
                .gate
                .decide(ApprovalRequest::new(call.clone()), events)
                .await;
            debug!(tool = %call.tool_name, ?decision, "Approval decided");
            match decision {
                ApprovalDecision::Deny => json!({ "error": DENIED_RESULT }),
                ApprovalDecision::AlwaysApprove => {
                    self.always_approved.insert(call.tool_name.clone());
                    self.execute(call).await
                }
                ApprovalDecision::Approve => self.execute(call).await,
            }
        } else {
            self.execute(call).await
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let failed = is_error_result(&result);
        let notice = self
            .doom_guard
            .record(&call.tool_name, &call.arguments, failed);

        let offloaded = if call.tool_name == PEEK_TOOL_NAME {
            None
        } else {
            self.store.offload(
                &call.tool_name,
                &result,
                self.settings.result_offload_threshold,
                self.settings.preview_chars,
            )
        };
        let (content, stored_id) = match offloaded {
            Some((id, stub)) => {
                info!(tool = %call.tool_name, result_id = %id, "Offloaded large tool result");
                (stub, Some(id))
            }
            None => (result, None),
        };

        self.conversation.push(Message::tool_result(
            &call.call_id,
            &call.tool_name,
            content.clone(),
        ));
        events.emit(AgentEvent::ToolCallFinished {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            result: content,
            stored_id,
            duration_ms,
        });

        notice
    }

    async fn execute(&self, call: &ToolCallEvent) -> Value {
        self.tools
            .execute(&call.tool_name, call.arguments.clone())
            .await
    }

    fn needs_approval(&self, tool_name: &str) -> bool {
        self.settings.approval == ApprovalPolicy::Ask
            && !self.always_approved.contains(tool_name)
            && self
                .tools
                .get(tool_name)
                .is_ok_and(|tool| tool.requires_approval())
    }

    fn finish(
        &mut self,
        outcome: TurnOutcome,
        text: String,
        usage: Usage,
        model: &str,
        iterations: u32,
        events: &EventSink,
    ) -> TurnOutcome {
        let cost = self.pricing.compute_cost(model, &usage);
        self.session_cost.record(usage, cost);
        info!(
            conversation_id = %self.conversation.id,
            ?outcome,
            iterations,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Turn finished"
        );
        events.emit(AgentEvent::TurnCompleted {
            outcome,
            text,
            usage,
            cost,
            iterations,
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use taor_core::error::ProviderError;
    use taor_core::provider::{AgentResponse, ToolDefinition};

    /// A mock provider that always returns the same text.
    struct MockProvider {
        response: String,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn complete(
            &self,
            history: &[Message],
            _tools: &[ToolDefinition],
            _system_prompt: &str,
        ) -> Result<AgentResponse, ProviderError> {
            self.calls.lock().unwrap().push(history.len());
            Ok(AgentResponse {
                text: Some(self.response.clone()),
                usage: Some(Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    ..Usage::default()
                }),
                model: "mock-model".into(),
                ..AgentResponse::default()
            })
        }
    }

    fn core(response: &str) -> (AgentCore, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider {
            response: response.into(),
            calls: Mutex::new(Vec::new()),
        });
        let agent = AgentCore::new(
            provider.clone(),
            Arc::new(ToolRegistry::new()),
            Arc::new(ResultStore::new()),
        );
        (agent, provider)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let (mut agent, provider) = core("Hello! How can I help?");
        let (sink, mut rx) = EventSink::channel();

        let outcome = agent
            .run_turn("Hello!", &sink, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Done);
        // User + Assistant
        assert_eq!(agent.history().len(), 2);
        assert_eq!(provider.calls.lock().unwrap().as_slice(), &[1]);

        assert_eq!(rx.recv().await.unwrap(), AgentEvent::TurnStarted);
        assert_eq!(
            rx.recv().await.unwrap(),
            AgentEvent::TextDelta {
                text: "Hello! How can I help?".into()
            }
        );
        match rx.recv().await.unwrap() {
            AgentEvent::TurnCompleted {
                outcome,
                usage,
                cost,
                iterations,
                ..
            } => {
                assert_eq!(outcome, TurnOutcome::Done);
                assert_eq!(usage.total_tokens(), 15);
                assert_eq!(iterations, 1);
                assert!(cost.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_turn_never_calls_backend() {
        let (mut agent, provider) = core("unused");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = agent
            .run_turn("hi", &EventSink::discard(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_and_restore_history() {
        let (mut agent, _) = core("ok");
        agent
            .run_turn("first", &EventSink::discard(), &CancelFlag::new())
            .await
            .unwrap();
        let saved = agent.conversation().clone();

        agent.clear();
        assert!(agent.history().is_empty());
        assert_eq!(agent.session_cost().turns, 1);

        agent.restore(saved.clone());
        assert_eq!(agent.history(), saved.messages.as_slice());
    }
}
