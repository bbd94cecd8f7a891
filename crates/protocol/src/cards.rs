//! Typed renderings of a tool result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A classified tool result, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Card {
    /// The tool reported failure.
    Error { message: String },

    /// Model-training output.
    Metrics { algorithm: String, metrics: Value },

    /// A single material record.
    Material {
        material_id: String,
        formula: String,
        /// Remaining fields of the record
        properties: Value,
    },

    /// A rendered plot on disk.
    Figure {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// A result that was offloaded; the renderer shows the preview.
    StoredResult {
        result_id: String,
        preview: String,
        total_size: u64,
    },

    /// Row-shaped results, truncated for display.
    Table {
        columns: Vec<String>,
        rows: Vec<Value>,
        total_rows: usize,
    },

    /// Anything else.
    Success { summary: String },
}

impl Card {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Metrics { .. } => "metrics",
            Self::Material { .. } => "material",
            Self::Figure { .. } => "figure",
            Self::StoredResult { .. } => "stored_result",
            Self::Table { .. } => "table",
            Self::Success { .. } => "success",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_tag_matches_kind() {
        let cards = [
            Card::Error { message: "x".into() },
            Card::Figure {
                path: "/tmp/a.png".into(),
                caption: None,
            },
            Card::Table {
                columns: vec!["a".into()],
                rows: vec![json!({"a": 1})],
                total_rows: 40,
            },
            Card::Success {
                summary: "ok".into(),
            },
        ];
        for card in cards {
            let value = serde_json::to_value(&card).unwrap();
            assert_eq!(value["kind"], card.kind());
        }
    }
}
