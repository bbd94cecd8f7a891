//! The core agent loop: the heart of TAOR.
//!
//! The agent follows a **Think → Act → Observe → Repeat** cycle:
//!
//! 1. **Receive** a user message
//! 2. **Call** the configured provider with the full history
//! 3. **If tool calls**: gate, execute, observe and append results, loop back to step 2
//! 4. **If text response**: record it and end the turn
//!
//! The loop continues until the LLM responds with text only, the iteration
//! limit is reached, or the turn is cancelled.

pub mod doom_loop;
pub mod loop_runner;

pub use doom_loop::DoomLoopGuard;
pub use loop_runner::{AgentCore, DENIED_RESULT};
