//! Running session cost.

use serde::{Deserialize, Serialize};
use taor_core::provider::Usage;

/// Cumulative spend and token usage for one agent session.
///
/// The total never decreases: turns with unknown pricing add their tokens
/// but leave the dollar total untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCost {
    pub total_usd: f64,
    pub usage: Usage,
    pub turns: u32,
    /// Turns whose model had no pricing entry
    pub unpriced_turns: u32,
}

impl SessionCost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one turn into the running totals.
    pub fn record(&mut self, usage: Usage, cost: Option<f64>) {
        self.usage += usage;
        self.turns += 1;
        match cost {
            Some(c) if c.is_finite() && c > 0.0 => self.total_usd += c,
            Some(_) => {}
            None => self.unpriced_turns += 1,
        }
    }

    /// Human-readable summary for the `/cost` command.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "${:.4} over {} turn(s) ({} in / {} out tokens, {} cache read, {} cache write)",
            self.total_usd,
            self.turns,
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.cache_read_tokens,
            self.usage.cache_creation_tokens,
        );
        if self.unpriced_turns > 0 {
            out.push_str(&format!("; {} turn(s) unpriced", self.unpriced_turns));
        }
        out
    }
}
