//! Agent events to OpenAI `chat.completion.chunk` frames.

use crate::openai::{ChatCompletionChunk, ChunkChoice, ChunkDelta, ToolCallDelta};
use crate::tools::intercept_tool_call;

use super::delta::DeltaTracker;
use super::types::StreamEvent;

/// Payload of the terminal SSE event (`data: [DONE]`).
pub const DONE_PAYLOAD: &str = "[DONE]";

/// `chatcmpl-<uuid>` identifier shared by streaming and batched responses.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Per-request converter; owns the delta state for one response.
#[derive(Debug)]
pub struct Converter {
    id: String,
    created: i64,
    model: String,
    include_thinking: bool,
    tracker: DeltaTracker,
}

impl Converter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            include_thinking: true,
            tracker: DeltaTracker::new(),
        }
    }

    /// Drop reasoning output when `false`.
    pub fn with_thinking(mut self, include_thinking: bool) -> Self {
        self.include_thinking = include_thinking;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// At most one chunk per event; `None` when the event adds nothing new.
    pub fn convert(&mut self, event: &StreamEvent) -> Option<ChatCompletionChunk> {
        let mut delta = ChunkDelta::default();

        if event.is_assistant_text() {
            let text = self.tracker.next_text(&event.extract_text());
            if !text.is_empty() {
                delta.content = Some(text);
            }
        }

        if self.include_thinking && event.is_thinking() {
            let thinking = self.tracker.next_thinking(&event.extract_thinking());
            if !thinking.is_empty() {
                delta.reasoning_content = Some(thinking);
            }
        }

        if let Some(call) = intercept_tool_call(event) {
            delta.tool_calls = Some(vec![ToolCallDelta { index: 0, call }]);
        }

        if delta.is_empty() {
            return None;
        }

        Some(ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
        })
    }
}
