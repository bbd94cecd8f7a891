//! LLM Provider implementations for TAOR.
//!
//! All providers implement the `taor_core::Provider` trait. Vendor wire
//! types never leave this crate: adapters translate the neutral history in
//! and the vendor response out.

pub mod anthropic;
pub mod capabilities;
pub mod factory;
mod http;
pub mod openai_compat;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use capabilities::ModelCapabilities;
pub use factory::{ProviderSettings, SUPPORTED_PROVIDERS, build_provider, default_model};
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};

/// Marks loop-injected notices when they travel inside a user turn.
pub(crate) const NOTICE_PREFIX: &str = "[system notice] ";
