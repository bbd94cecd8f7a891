//! Short progress phrases for tool calls.

/// Exact tool names with hand-written phrases.
const VERBS: &[(&str, &str)] = &[
    ("peek_result", "Reading stored result"),
    ("search_materials", "Searching materials database"),
    ("get_structure", "Fetching crystal structure"),
    ("train_model", "Training model"),
    ("predict_properties", "Predicting properties"),
    ("plot_band_structure", "Plotting band structure"),
    ("web_search", "Searching the web"),
    ("http_request", "Making HTTP request"),
    ("file_read", "Reading file"),
    ("file_write", "Writing file"),
    ("shell", "Running command"),
];

/// Name prefixes and the phrase stem they map to.
const PREFIXES: &[(&str, &str)] = &[
    ("search_", "Searching"),
    ("get_", "Fetching"),
    ("fetch_", "Fetching"),
    ("train_", "Training"),
    ("predict", "Predicting"),
    ("plot_", "Plotting"),
    ("visualize_", "Visualizing"),
    ("list_", "Listing"),
];

/// Phrase shown while `tool_name` runs.
pub fn verb_for(tool_name: &str) -> String {
    if let Some((_, verb)) = VERBS.iter().find(|(name, _)| *name == tool_name) {
        return (*verb).to_string();
    }

    for (prefix, stem) in PREFIXES {
        if let Some(rest) = tool_name.strip_prefix(prefix) {
            let object = rest.trim_start_matches('_').replace('_', " ");
            return if object.is_empty() {
                (*stem).to_string()
            } else {
                format!("{stem} {object}")
            };
        }
    }

    format!("Running {tool_name}")
}
