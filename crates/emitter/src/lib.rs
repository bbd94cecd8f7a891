//! # TAOR Emitter
//!
//! The presentation layer between the agent loop and any renderer. It
//! consumes raw [`AgentEvent`](taor_core::AgentEvent)s and decides what the
//! renderer sees: plan cards cut out of streamed text, classified result
//! cards, progress verbs, prompts and running cost. Renderers only draw.

pub mod classify;
pub mod emitter;
pub mod plan;
pub mod verbs;

pub use classify::classify;
pub use emitter::UiEmitter;
pub use plan::{PlanDetector, Segment};
pub use verbs::verb_for;
