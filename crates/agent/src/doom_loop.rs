//! Doom-loop detection.
//!
//! Watches a sliding window of recent tool invocations. When the same tool
//! is called with identical arguments and fails several times in a row, the
//! guard asks the loop to inject a single notice telling the model to change
//! course. A success or any different invocation ends the streak.

use std::collections::VecDeque;

use serde_json::Value;

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
struct Invocation {
    key: String,
    failed: bool,
}

#[derive(Debug, Clone)]
pub struct DoomLoopGuard {
    recent: VecDeque<Invocation>,
    window: usize,
    threshold: usize,
}

impl Default for DoomLoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl DoomLoopGuard {
    pub fn new(window: usize, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            recent: VecDeque::with_capacity(window),
            window: window.max(threshold),
            threshold,
        }
    }

    /// Record one invocation. Returns the notice text exactly once per
    /// streak, on the invocation that makes the streak reach the threshold.
    pub fn record(&mut self, tool_name: &str, arguments: &Value, failed: bool) -> Option<String> {
        let key = format!("{tool_name}:{}", canonical(arguments));
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(Invocation { key, failed });

        (self.streak() == self.threshold).then(|| {
            format!(
                "The tool '{tool_name}' has failed {} times in a row with identical arguments. \
                 Do not call it again with the same arguments. Change the arguments, try a \
                 different tool, or explain the problem to the user.",
                self.threshold
            )
        })
    }

    /// Length of the trailing run of identical failed invocations.
    fn streak(&self) -> usize {
        let Some(last) = self.recent.back() else {
            return 0;
        };
        if !last.failed {
            return 0;
        }
        self.recent
            .iter()
            .rev()
            .take_while(|inv| inv.failed && inv.key == last.key)
            .count()
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

/// Serialize with object keys sorted at every depth.
fn canonical(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), sorted(v)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn two_failures_inject_nothing() {
        let mut guard = DoomLoopGuard::default();
        let args = json!({"formula": "XyZ"});
        assert!(guard.record("search", &args, true).is_none());
        assert!(guard.record("search", &args, true).is_none());
    }

    #[test]
    fn third_identical_failure_injects_exactly_once() {
        let mut guard = DoomLoopGuard::default();
        let args = json!({"formula": "XyZ"});
        guard.record("search", &args, true);
        guard.record("search", &args, true);
        let notice = guard.record("search", &args, true).unwrap();
        assert!(notice.contains("'search'"));
        assert!(guard.record("search", &args, true).is_none());
        assert!(guard.record("search", &args, true).is_none());
    }

    #[test]
    fn success_resets_the_streak() {
        let mut guard = DoomLoopGuard::default();
        let args = json!({"q": 1});
        guard.record("t", &args, true);
        guard.record("t", &args, true);
        guard.record("t", &args, false);
        assert!(guard.record("t", &args, true).is_none());
        assert!(guard.record("t", &args, true).is_none());
        assert!(guard.record("t", &args, true).is_some());
    }

    #[test]
    fn different_arguments_break_the_streak() {
        let mut guard = DoomLoopGuard::default();
        guard.record("t", &json!({"q": 1}), true);
        guard.record("t", &json!({"q": 1}), true);
        assert!(guard.record("t", &json!({"q": 2}), true).is_none());
        assert!(guard.record("t", &json!({"q": 1}), true).is_none());
    }

    #[test]
    fn key_order_does_not_matter() {
        let mut guard = DoomLoopGuard::default();
        guard.record("t", &json!({"a": 1, "b": {"y": 2, "x": 1}}), true);
        guard.record("t", &json!({"b": {"x": 1, "y": 2}, "a": 1}), true);
        assert!(guard.record("t", &json!({"a": 1, "b": {"y": 2, "x": 1}}), true).is_some());
    }

    #[test]
    fn window_is_bounded() {
        let mut guard = DoomLoopGuard::new(4, 3);
        for i in 0..20 {
            guard.record("t", &json!({"i": i}), false);
        }
        assert_eq!(guard.recent.len(), 4);
    }
}
