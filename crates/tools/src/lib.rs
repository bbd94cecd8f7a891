//! Built-in tools and result storage for TAOR.
//!
//! Domain tools are registered by the embedding application; this crate
//! ships only what the loop itself relies on: the content-addressed
//! [`ResultStore`] that large results are offloaded into, and the
//! `peek_result` tool the model uses to read them back.

pub mod peek;
pub mod result_store;

use std::sync::Arc;

use taor_core::error::ToolError;
use taor_core::tool::ToolRegistry;

pub use peek::{PEEK_TOOL_NAME, PeekResultTool};
pub use result_store::{Page, ResultStore, StoredResult};

/// Create a registry holding the built-in tools, bound to `store`.
///
/// Callers register their domain tools on the returned registry.
pub fn default_registry(store: Arc<ResultStore>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(PeekResultTool::new(store)))?;
    Ok(registry)
}
