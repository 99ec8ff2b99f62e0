//! `cursor-agent` NDJSON event shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Keys in a tool-call payload that never name the call type.
pub const RESERVED_TOOL_KEYS: &[&str] = &["args", "result"];

/// Coarse classification of an event's `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Assistant,
    Thinking,
    ToolCall,
    Result,
    Other,
}

/// One parsed line of agent output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<StreamMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

/// Message body carried by `assistant` events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<StreamContent>,
}

/// A text or thinking block inside a [`StreamMessage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamContent {
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Polymorphic tool-call document, e.g. `{"runCommandToolCall": {"args": {...}}}`.
///
/// Keys are held in a sorted map so the call-type key is always picked in the
/// same order regardless of how the agent serialized the object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCallPayload(pub BTreeMap<String, Box<RawValue>>);

/// The meaningful entry of a [`ToolCallPayload`].
#[derive(Debug, Clone, Copy)]
pub struct ToolInvocation<'a> {
    /// Call-type key, e.g. `runCommandToolCall`.
    pub key: &'a str,
    /// The document stored under that key, verbatim.
    pub body: &'a RawValue,
}

impl ToolCallPayload {
    /// First non-reserved key in sorted order.
    pub fn invocation(&self) -> Option<ToolInvocation<'_>> {
        self.0
            .iter()
            .find(|(key, _)| !RESERVED_TOOL_KEYS.contains(&key.as_str()))
            .map(|(key, body)| ToolInvocation {
                key: key.as_str(),
                body: body.as_ref(),
            })
    }
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "assistant" => EventKind::Assistant,
            "thinking" => EventKind::Thinking,
            "tool_call" => EventKind::ToolCall,
            "result" => EventKind::Result,
            _ => EventKind::Other,
        }
    }

    fn content_blocks(&self) -> &[StreamContent] {
        self.message
            .as_ref()
            .map(|m| m.content.as_slice())
            .unwrap_or(&[])
    }

    /// True for assistant events with at least one non-empty text block.
    pub fn is_assistant_text(&self) -> bool {
        self.kind() == EventKind::Assistant
            && self.content_blocks().iter().any(|c| {
                c.content_type == "text" && c.text.as_deref().is_some_and(|t| !t.is_empty())
            })
    }

    /// True for `thinking` events and assistant events carrying thinking blocks.
    pub fn is_thinking(&self) -> bool {
        match self.kind() {
            EventKind::Thinking => true,
            EventKind::Assistant => self.content_blocks().iter().any(|c| {
                c.content_type == "thinking"
                    && c.thinking.as_deref().is_some_and(|t| !t.is_empty())
            }),
            _ => false,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        self.kind() == EventKind::ToolCall
    }

    pub fn is_result(&self) -> bool {
        self.kind() == EventKind::Result
    }

    /// Concatenated text of all text blocks.
    pub fn extract_text(&self) -> String {
        self.content_blocks()
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect()
    }

    /// Thinking text: the top-level `text` of a thinking event, or the
    /// concatenated thinking blocks of an assistant message.
    pub fn extract_thinking(&self) -> String {
        if self.kind() == EventKind::Thinking {
            return self.text.clone().unwrap_or_default();
        }
        self.content_blocks()
            .iter()
            .filter(|c| c.content_type == "thinking")
            .filter_map(|c| c.thinking.as_deref())
            .collect()
    }
}
