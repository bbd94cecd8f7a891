//! `peek_result`: page through an offloaded tool result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use taor_core::error::ToolError;
use taor_core::tool::Tool;

use crate::result_store::ResultStore;

/// Pages are returned whole; the loop never offloads this tool's output.
pub const PEEK_TOOL_NAME: &str = "peek_result";

const DEFAULT_LIMIT: u64 = 2000;
const MAX_LIMIT: u64 = 8000;

pub struct PeekResultTool {
    store: Arc<ResultStore>,
}

impl PeekResultTool {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PeekResultTool {
    fn name(&self) -> &str {
        PEEK_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read part of a large tool result that was stored instead of returned in full. \
         Pass the result_id from the truncated result. Use `pointer` (a JSON pointer such as \
         /results/3) to fetch one part of the value, or `offset`/`limit` to page through the \
         raw JSON text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result_id": {
                    "type": "string",
                    "description": "Id from the stored-result preview"
                },
                "pointer": {
                    "type": "string",
                    "description": "Optional JSON pointer into the stored value, e.g. /results/0"
                },
                "offset": {
                    "type": "integer",
                    "description": "Character offset into the serialized result (default 0)",
                    "default": 0
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 2000, max 8000)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["result_id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let result_id = arguments["result_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'result_id' argument".into()))?;
        let offset = arguments["offset"].as_u64().unwrap_or(0) as usize;
        let limit = arguments["limit"]
            .as_u64()
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT) as usize;

        let entry = self.store.get(result_id).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("No stored result with id '{result_id}'"),
        })?;

        if let Some(pointer) = arguments["pointer"].as_str() {
            let value = entry.payload.pointer(pointer).ok_or_else(|| {
                ToolError::InvalidArguments(format!("Pointer '{pointer}' not found in result"))
            })?;
            let text = value.to_string();
            let total_chars = text.chars().count();
            let content: String = text.chars().skip(offset).take(limit).collect();
            let end = offset + content.chars().count();
            return Ok(json!({
                "result_id": result_id,
                "pointer": pointer,
                "offset": offset,
                "content": content,
                "total_chars": total_chars,
                "next_offset": (end < total_chars).then_some(end),
            }));
        }

        let page = self
            .store
            .page(result_id, offset, limit)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("No stored result with id '{result_id}'"),
            })?;
        serde_json::to_value(page).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PeekResultTool, String) {
        let store = Arc::new(ResultStore::new());
        let rows: Vec<Value> = (0..50).map(|i| json!({"row": i})).collect();
        let id = store.put("list_rows", &json!({"results": rows}));
        (PeekResultTool::new(store), id)
    }

    #[tokio::test]
    async fn pages_from_offset() {
        let (tool, id) = setup();
        let first = tool
            .execute(json!({"result_id": id, "limit": 10}))
            .await
            .unwrap();
        assert_eq!(first["content"], r#"{"results""#);
        assert_eq!(first["next_offset"], 10);

        let second = tool
            .execute(json!({"result_id": id, "offset": 10, "limit": 5}))
            .await
            .unwrap();
        assert_eq!(second["offset"], 10);
        assert_eq!(second["content"], r#":[{"r"#);
    }

    #[tokio::test]
    async fn pointer_selects_sub_value() {
        let (tool, id) = setup();
        let out = tool
            .execute(json!({"result_id": id, "pointer": "/results/7"}))
            .await
            .unwrap();
        assert_eq!(out["content"], r#"{"row":7}"#);
        assert!(out["next_offset"].is_null());
    }

    #[tokio::test]
    async fn unknown_id_and_bad_pointer_are_errors() {
        let (tool, id) = setup();
        assert!(tool.execute(json!({"result_id": "nope"})).await.is_err());
        assert!(
            tool.execute(json!({"result_id": id, "pointer": "/missing"}))
                .await
                .is_err()
        );
        assert!(tool.execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn last_page_has_no_next_offset() {
        let (tool, id) = setup();
        let out = tool
            .execute(json!({"result_id": id, "limit": 8000}))
            .await
            .unwrap();
        assert!(out.get("next_offset").is_none());
    }
}
