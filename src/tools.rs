//! Tool-call normalization and repeated-call detection.
//!
//! `cursor-agent` reports tool calls as a document keyed by the call type
//! (`{"runCommandToolCall": {"args": {...}}}`). OpenClaw and other OpenAI
//! clients expect plain function names such as `bash` or `edit`, so names are
//! derived from that key and folded through a fixed alias table.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::openai::{FunctionCall, ToolCall};
use crate::streaming::StreamEvent;

/// Suffix `cursor-agent` appends to call-type keys.
pub const TOOL_CALL_SUFFIX: &str = "ToolCall";

/// Name used when no call-type key is present.
pub const FALLBACK_TOOL_NAME: &str = "tool";

/// Default number of identical calls allowed by [`LoopGuard`].
pub const DEFAULT_MAX_REPEATS: usize = 3;

/// Agent-native and OpenClaw-style synonyms, keyed lower-case.
const ALIASES: &[(&str, &str)] = &[
    ("runcommand", "bash"),
    ("run_command", "bash"),
    ("runcommandtoolcall", "bash"),
    ("run_command_tool_call", "bash"),
    ("shell", "bash"),
    ("shelltoolcall", "bash"),
    ("exec", "bash"),
    ("bash", "bash"),
    ("write", "write"),
    ("edit", "edit"),
    ("read", "read"),
    ("apply_patch", "edit"),
];

/// Canonical name for a raw tool name. Unknown names pass through unchanged.
pub fn normalize_name(name: &str) -> String {
    if name.is_empty() {
        return FALLBACK_TOOL_NAME.to_string();
    }
    let lower = name.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Raw tool name from a call-type key: `runCommandToolCall` -> `runCommand`.
fn name_from_key(key: &str) -> String {
    match key.strip_suffix(TOOL_CALL_SUFFIX) {
        Some(base) if !base.is_empty() => {
            let mut chars = base.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => key.to_lowercase(),
    }
}

/// Raw (un-aliased) tool name of a tool-call event, empty when unknown.
pub fn infer_tool_name(event: &StreamEvent) -> String {
    event
        .tool_call
        .as_ref()
        .and_then(|payload| payload.invocation())
        .map(|invocation| name_from_key(invocation.key))
        .unwrap_or_default()
}

/// JSON arguments string of a tool-call event.
///
/// Uses the nested `args` object when present, otherwise the raw document
/// under the call-type key, otherwise `{}`.
pub fn extract_arguments(event: &StreamEvent) -> String {
    let Some(invocation) = event
        .tool_call
        .as_ref()
        .and_then(|payload| payload.invocation())
    else {
        return "{}".to_string();
    };

    #[derive(serde::Deserialize)]
    struct Nested {
        args: Option<Map<String, Value>>,
    }

    match serde_json::from_str::<Nested>(invocation.body.get()) {
        Ok(Nested { args: Some(args) }) => {
            serde_json::to_string(&args).unwrap_or_else(|_| invocation.body.get().to_string())
        }
        _ => invocation.body.get().to_string(),
    }
}

/// Convert a tool-call event into an OpenAI tool call. `None` for other events.
pub fn intercept_tool_call(event: &StreamEvent) -> Option<ToolCall> {
    if !event.is_tool_call() {
        return None;
    }
    let id = event
        .call_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or("unknown")
        .to_string();
    Some(ToolCall {
        id,
        call_type: "function".to_string(),
        function: FunctionCall {
            name: normalize_name(&infer_tool_name(event)),
            arguments: extract_arguments(event),
        },
    })
}

/// Fingerprint identifying a call by name and serialized arguments.
pub fn fingerprint(name: &str, args: &str) -> String {
    format!("{}:{}", name, args)
}

/// Bounds how many times an identical tool call may be repeated.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    counts: HashMap<String, usize>,
    max_repeats: usize,
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPEATS)
    }
}

impl LoopGuard {
    /// A zero maximum falls back to [`DEFAULT_MAX_REPEATS`].
    pub fn new(max_repeats: usize) -> Self {
        Self {
            counts: HashMap::new(),
            max_repeats: if max_repeats == 0 {
                DEFAULT_MAX_REPEATS
            } else {
                max_repeats
            },
        }
    }

    pub fn max_repeats(&self) -> usize {
        self.max_repeats
    }

    /// Count a call; `false` once it has been repeated more than the maximum.
    pub fn record(&mut self, name: &str, args: &str) -> bool {
        let count = self.counts.entry(fingerprint(name, args)).or_insert(0);
        *count += 1;
        let allowed = *count <= self.max_repeats;
        if !allowed {
            tracing::warn!(
                "Tool call {} repeated {} times (max {})",
                name,
                count,
                self.max_repeats
            );
        }
        allowed
    }

    /// Convenience wrapper for a normalized call.
    pub fn record_call(&mut self, call: &ToolCall) -> bool {
        self.record(&call.function.name, &call.function.arguments)
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}
