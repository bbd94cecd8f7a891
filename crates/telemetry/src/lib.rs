//! Cost tracking for TAOR sessions.
//!
//! Real-time cost estimation with built-in model pricing (including
//! prompt-cache tokens) and a monotonic per-session accumulator.

pub mod cost;
pub mod pricing;

pub use cost::SessionCost;
pub use pricing::{ModelPricing, PricingTable};
