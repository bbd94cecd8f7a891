//! Tool-result classification.
//!
//! An ordered chain of shape checks; the first match wins and the last
//! branch matches everything, so every result gets exactly one card.
//!
//! | # | Shape                                  | Card            |
//! |---|----------------------------------------|-----------------|
//! | 1 | not an object                          | `Success`       |
//! | 2 | has `error`                            | `Error`         |
//! | 3 | has `metrics` and `algorithm`          | `Metrics`       |
//! | 4 | has `material_id` and `formula`        | `Material`      |
//! | 5 | has `plot_path` or `figure_path`       | `Figure`        |
//! | 6 | has `result_id` and `preview`          | `StoredResult`  |
//! | 7 | `results` array with more than 3 items | `Table`         |
//! | 8 | anything else                          | `Success`       |

use serde_json::{Map, Value};
use taor_protocol::Card;

/// More rows than this turn a `results` list into a table.
pub const TABLE_MIN_ROWS: usize = 3;

/// Rows shown in a table card.
pub const MAX_TABLE_ROWS: usize = 20;

/// Characters kept in summaries and previews.
pub const MAX_SUMMARY_CHARS: usize = 300;

pub fn classify(result: &Value) -> Card {
    let Some(map) = result.as_object() else {
        return Card::Success {
            summary: summarize(result),
        };
    };

    if let Some(error) = map.get("error") {
        return Card::Error {
            message: match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };
    }

    if let (Some(metrics), Some(algorithm)) = (map.get("metrics"), map.get("algorithm")) {
        return Card::Metrics {
            algorithm: text_of(algorithm),
            metrics: metrics.clone(),
        };
    }

    if let (Some(id), Some(formula)) = (map.get("material_id"), map.get("formula")) {
        let properties: Map<String, Value> = map
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "material_id" | "formula"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        return Card::Material {
            material_id: text_of(id),
            formula: text_of(formula),
            properties: Value::Object(properties),
        };
    }

    if let Some(path) = map.get("plot_path").or_else(|| map.get("figure_path")) {
        return Card::Figure {
            path: text_of(path),
            caption: map
                .get("caption")
                .or_else(|| map.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
        };
    }

    if let (Some(id), Some(preview)) = (map.get("result_id"), map.get("preview")) {
        return Card::StoredResult {
            result_id: text_of(id),
            preview: bounded(&text_of(preview), MAX_SUMMARY_CHARS),
            total_size: map.get("total_size").and_then(Value::as_u64).unwrap_or(0),
        };
    }

    if let Some(rows) = map.get("results").and_then(Value::as_array)
        && rows.len() > TABLE_MIN_ROWS
    {
        let shown: Vec<Value> = rows.iter().take(MAX_TABLE_ROWS).cloned().collect();
        return Card::Table {
            columns: columns_of(&shown),
            rows: shown,
            total_rows: rows.len(),
        };
    }

    Card::Success {
        summary: summarize(result),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Union of object keys across rows, in first-seen order.
fn columns_of(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows.iter().filter_map(Value::as_object) {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn summarize(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => "done".to_string(),
        other => other.to_string(),
    };
    bounded(&text, MAX_SUMMARY_CHARS)
}

/// Truncate to `max` characters, marking the cut.
pub fn bounded(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
