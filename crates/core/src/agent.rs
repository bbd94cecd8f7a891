//! Agent configuration and turn-level state types.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum backend calls per user turn (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Whether approval-gated tools need a human decision
    #[serde(default)]
    pub approval: ApprovalPolicy,

    /// Serialized result size (bytes) above which results are offloaded
    #[serde(default = "default_offload_threshold")]
    pub result_offload_threshold: usize,

    /// Characters of an offloaded result kept inline as a preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// System prompt sent with every backend call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_offload_threshold() -> usize {
    4000
}
fn default_preview_chars() -> usize {
    1000
}
fn default_system_prompt() -> String {
    "You are a careful research assistant. Use the available tools when they help, \
     and explain your reasoning briefly. For multi-step work, first outline the steps \
     inside <plan></plan> tags."
        .into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            approval: ApprovalPolicy::default(),
            result_offload_threshold: default_offload_threshold(),
            preview_chars: default_preview_chars(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// How approval-gated tools are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Ask a human before each gated call (default)
    #[default]
    Ask,
    /// Run gated tools without asking
    Auto,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Done,
    /// The iteration limit was reached.
    MaxIterations,
    /// Cancellation was observed between iterations.
    Cancelled,
}

/// Cooperative cancellation shared between a turn and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the flag for the next turn.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_defaults_to_ask() {
        assert_eq!(ApprovalPolicy::default(), ApprovalPolicy::Ask);
    }

    #[test]
    fn settings_defaults() {
        let settings = AgentSettings::default();
        assert_eq!(settings.max_iterations, 25);
        assert_eq!(settings.result_offload_threshold, 4000);
        assert!(settings.system_prompt.contains("<plan>"));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }
}
