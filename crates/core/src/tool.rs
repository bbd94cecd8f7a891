//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools receive a structured argument object matching their declared
//! schema and return a structured result. A result object carrying an
//! `error` key signals failure; a tool never brings the loop down.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::ToolError;
use crate::provider::{ToolDefinition, Vendor};

/// The core Tool trait.
///
/// Tools are registered in the [`ToolRegistry`] and made available to the
/// agent loop. A tool is immutable once registered.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_materials", "peek_result").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Whether a human must approve each invocation.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type Handler =
    Box<dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, ToolError>> + Send + Sync>;

/// A tool backed by a closure, for callers that don't want a dedicated type.
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Value,
    requires_approval: bool,
    handler: Handler,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            requires_approval: false,
            handler: Box::new(move |args| handler(args).boxed()),
        }
    }

    /// Require human approval before every invocation.
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
        (self.handler)(arguments).await
    }
}

/// A registry of available tools.
///
/// Built once at startup and shared immutably afterwards. Names are unique:
/// registering a second tool under an existing name is rejected.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> std::result::Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Project every tool into a vendor's tool-definition array.
    pub fn to_vendor_format(&self, vendor: Vendor) -> Value {
        Value::Array(
            self.tools
                .values()
                .map(|t| t.to_definition().to_vendor(vendor))
                .collect(),
        )
    }

    /// Execute a tool by name.
    ///
    /// Never fails: unknown tools, handler errors and handler panics all
    /// come back as `{"error": message}`.
    pub async fn execute(&self, name: &str, arguments: Value) -> Value {
        let tool = match self.get(name) {
            Ok(tool) => tool,
            Err(e) => return json!({ "error": e.to_string() }),
        };

        match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
            Ok(Ok(value)) if value.is_object() => value,
            Ok(Ok(value)) => json!({ "result": value }),
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool returned an error");
                json!({ "error": e.to_string() })
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(tool = %name, %reason, "Tool panicked");
                json!({ "error": format!("tool '{name}' panicked: {reason}") })
            }
        }
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(json!({ "echo": text }))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str { "explode" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: Value) -> std::result::Result<Value, ToolError> {
            panic!("kaboom");
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert_eq!(registry.get("echo").unwrap().name(), "echo");
        assert!(matches!(
            registry.get("nonexistent"),
            Err(ToolError::NotFound(name)) if name == "nonexistent"
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PanickingTool)).unwrap();
        registry.register(Box::new(EchoTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "explode");
    }

    #[test]
    fn vendor_format_is_deterministic() {
        let mut a = ToolRegistry::new();
        a.register(Box::new(EchoTool)).unwrap();
        a.register(Box::new(PanickingTool)).unwrap();
        let mut b = ToolRegistry::new();
        b.register(Box::new(PanickingTool)).unwrap();
        b.register(Box::new(EchoTool)).unwrap();

        assert_eq!(
            a.to_vendor_format(Vendor::Anthropic),
            b.to_vendor_format(Vendor::Anthropic)
        );
        let openai = a.to_vendor_format(Vendor::OpenAi);
        assert_eq!(openai[0]["function"]["name"], "echo");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let result = registry.execute("echo", json!({"text": "hello world"})).await;
        assert_eq!(result, json!({"echo": "hello world"}));
    }

    #[tokio::test]
    async fn handler_error_becomes_error_value() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let result = registry.execute("echo", json!({})).await;
        assert!(result["error"].as_str().unwrap().contains("missing 'text'"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_error_value() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PanickingTool)).unwrap();

        let result = registry.execute("explode", json!({})).await;
        assert!(result["error"].as_str().unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonexistent", json!({})).await;
        assert!(result["error"].as_str().unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    async fn function_tool_wraps_scalar_results() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(FunctionTool::new(
                "answer",
                "Returns 42",
                json!({"type": "object"}),
                |_args| async { Ok(json!(42)) },
            )))
            .unwrap();

        let result = registry.execute("answer", json!({})).await;
        assert_eq!(result, json!({"result": 42}));
        assert!(!registry.get("answer").unwrap().requires_approval());
    }
}
