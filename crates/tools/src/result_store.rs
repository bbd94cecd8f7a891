//! Content-addressed store for large tool results.
//!
//! Entries are write-once: the id is derived from the serialized payload,
//! so storing the same payload twice yields the same id and the original
//! entry is kept.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex characters of the SHA-256 digest used as the id.
pub const ID_LEN: usize = 12;

/// One stored payload.
#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub id: String,
    pub tool_name: String,
    pub payload: Value,
    /// The payload's JSON serialization, paged by `peek_result`
    #[serde(skip)]
    pub serialized: String,
    pub created_at: DateTime<Utc>,
}

impl StoredResult {
    /// Size of the serialized payload in bytes.
    pub fn total_size(&self) -> usize {
        self.serialized.len()
    }
}

/// A window over a stored payload's serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub result_id: String,
    pub offset: usize,
    pub content: String,
    pub total_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// Thread-safe result store shared by the agent loop and the peek tool.
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: DashMap<String, Arc<StoredResult>>,
}

/// Content id for a serialized payload.
pub fn content_id(serialized: &str) -> String {
    let digest = Sha256::digest(serialized.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    id
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload and return its id.
    pub fn put(&self, tool_name: &str, payload: &Value) -> String {
        let serialized = payload.to_string();
        let id = content_id(&serialized);
        self.entries.entry(id.clone()).or_insert_with(|| {
            debug!(result_id = %id, tool = tool_name, bytes = serialized.len(), "Stored tool result");
            Arc::new(StoredResult {
                id: id.clone(),
                tool_name: tool_name.to_string(),
                payload: payload.clone(),
                serialized,
                created_at: Utc::now(),
            })
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<StoredResult>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Read up to `limit` characters starting at character `offset`.
    pub fn page(&self, id: &str, offset: usize, limit: usize) -> Option<Page> {
        let entry = self.get(id)?;
        let total_chars = entry.serialized.chars().count();
        let content: String = entry.serialized.chars().skip(offset).take(limit).collect();
        let end = offset.saturating_add(content.chars().count());
        Some(Page {
            result_id: entry.id.clone(),
            offset,
            content,
            total_chars,
            next_offset: (end < total_chars).then_some(end),
        })
    }

    /// Offload `payload` if its serialization exceeds `threshold` bytes.
    ///
    /// Returns the stub to keep in history in its place: the id, a bounded
    /// preview, the full size, and a note pointing at `peek_result`.
    pub fn offload(
        &self,
        tool_name: &str,
        payload: &Value,
        threshold: usize,
        preview_chars: usize,
    ) -> Option<(String, Value)> {
        let serialized = payload.to_string();
        if serialized.len() <= threshold {
            return None;
        }

        let id = self.put(tool_name, payload);
        let preview: String = serialized.chars().take(preview_chars).collect();
        let stub = json!({
            "result_id": id,
            "preview": preview,
            "total_size": serialized.len(),
            "note": format!(
                "Result too large to include in full ({} bytes). \
                 Call peek_result with this result_id to read more.",
                serialized.len()
            ),
        });
        Some((id, stub))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big_payload() -> Value {
        let rows: Vec<Value> = (0..200)
            .map(|i| json!({"material_id": format!("mp-{i}"), "band_gap": i as f64 / 10.0}))
            .collect();
        json!({ "results": rows })
    }

    #[test]
    fn id_is_twelve_hex_chars_of_sha256() {
        let id = content_id("{}");
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        // sha256("{}") = 44136fa355b3678a...
        assert_eq!(id, "44136fa355b3");
    }

    #[test]
    fn same_payload_same_id_write_once() {
        let store = ResultStore::new();
        let a = store.put("search", &json!({"x": 1}));
        let first_created = store.get(&a).unwrap().created_at;
        let b = store.put("other_tool", &json!({"x": 1}));
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        let entry = store.get(&a).unwrap();
        assert_eq!(entry.tool_name, "search");
        assert_eq!(entry.created_at, first_created);
    }

    #[test]
    fn small_results_are_not_offloaded() {
        let store = ResultStore::new();
        assert!(store.offload("t", &json!({"ok": true}), 4000, 1000).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn large_results_become_stubs() {
        let store = ResultStore::new();
        let payload = big_payload();
        let size = payload.to_string().len();
        assert!(size > 4000);

        let (id, stub) = store.offload("search_materials", &payload, 4000, 1000).unwrap();
        assert_eq!(stub["result_id"], id.as_str());
        assert_eq!(stub["total_size"], size);
        assert_eq!(stub["preview"].as_str().unwrap().chars().count(), 1000);
        assert!(stub["note"].as_str().unwrap().contains("peek_result"));
        assert!(stub.to_string().len() < 4000);
        assert_eq!(store.get(&id).unwrap().payload, payload);
    }

    #[test]
    fn paging_walks_the_whole_payload() {
        let store = ResultStore::new();
        let id = store.put("t", &big_payload());
        let total = store.get(&id).unwrap().serialized.clone();

        let mut offset = 0;
        let mut rebuilt = String::new();
        loop {
            let page = store.page(&id, offset, 1500).unwrap();
            rebuilt.push_str(&page.content);
            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }
        assert_eq!(rebuilt, total);
    }

    #[test]
    fn paging_respects_multibyte_chars() {
        let store = ResultStore::new();
        let id = store.put("t", &json!({"s": "ααααα"}));
        let page = store.page(&id, 6, 3).unwrap();
        assert_eq!(page.content, "ααα");
        assert!(store.page("missing", 0, 10).is_none());
    }
}
