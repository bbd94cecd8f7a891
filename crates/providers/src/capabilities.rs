//! Static per-model capability table.
//!
//! Lookup is by longest matching prefix so dated snapshots
//! (`claude-sonnet-4-20250514`) resolve to their family entry.

/// Output/context limits for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub max_output_tokens: u32,
    pub context_window: u32,
}

/// Conservative defaults for model ids not in the table.
pub const FALLBACK: ModelCapabilities = ModelCapabilities {
    max_output_tokens: 4096,
    context_window: 32_000,
};

const TABLE: &[(&str, ModelCapabilities)] = &[
    ("claude-opus-4", caps(32_000, 200_000)),
    ("claude-sonnet-4", caps(64_000, 200_000)),
    ("claude-3-7-sonnet", caps(64_000, 200_000)),
    ("claude-3-5-sonnet", caps(8192, 200_000)),
    ("claude-3-5-haiku", caps(8192, 200_000)),
    ("claude-haiku-4", caps(64_000, 200_000)),
    ("gpt-4o-mini", caps(16_384, 128_000)),
    ("gpt-4o", caps(16_384, 128_000)),
    ("gpt-4.1", caps(32_768, 1_047_576)),
    ("o3", caps(100_000, 200_000)),
    ("o4-mini", caps(100_000, 200_000)),
    ("gemini-2.5-pro", caps(65_536, 1_048_576)),
    ("gemini-2.5-flash", caps(65_536, 1_048_576)),
    ("gemini-2.0-flash", caps(8192, 1_048_576)),
    ("llama3", caps(4096, 128_000)),
    ("qwen2.5", caps(8192, 32_768)),
];

const fn caps(max_output_tokens: u32, context_window: u32) -> ModelCapabilities {
    ModelCapabilities {
        max_output_tokens,
        context_window,
    }
}

/// Capabilities for `model`, falling back to [`FALLBACK`].
///
/// Vendor prefixes such as `gemini/` are ignored.
pub fn lookup(model: &str) -> ModelCapabilities {
    let bare = strip_vendor_prefix(model);
    TABLE
        .iter()
        .filter(|(prefix, _)| bare.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, caps)| *caps)
        .unwrap_or(FALLBACK)
}

/// `gemini/gemini-2.0-flash` → `gemini-2.0-flash`.
pub fn strip_vendor_prefix(model: &str) -> &str {
    model.split_once('/').map_or(model, |(_, rest)| rest)
}
