//! Batched (non-streaming) response assembly.

use std::collections::HashSet;

use tokio::io::AsyncRead;

use crate::openai::{AssistantMessage, ChatCompletion, CompletionChoice, ToolCall};
use crate::tools::intercept_tool_call;

use super::delta::DeltaTracker;
use super::scanner::{EventScanner, Scanned};
use super::sse::completion_id;
use super::types::StreamEvent;

/// Folds a whole event stream into one assistant message.
#[derive(Debug)]
pub struct CompletionAccumulator {
    include_thinking: bool,
    tracker: DeltaTracker,
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    seen_call_ids: HashSet<String>,
}

impl Default for CompletionAccumulator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CompletionAccumulator {
    pub fn new(include_thinking: bool) -> Self {
        Self {
            include_thinking,
            tracker: DeltaTracker::new(),
            content: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            seen_call_ids: HashSet::new(),
        }
    }

    pub fn push(&mut self, event: &StreamEvent) {
        if event.is_assistant_text() {
            let delta = self.tracker.next_text(&event.extract_text());
            self.content.push_str(&delta);
        }
        if self.include_thinking && event.is_thinking() {
            let delta = self.tracker.next_thinking(&event.extract_thinking());
            self.reasoning.push_str(&delta);
        }
        if let Some(call) = intercept_tool_call(event) {
            // The agent reports each call twice (started, completed) under one id.
            let repeated = event
                .call_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .is_some_and(|id| !self.seen_call_ids.insert(id.to_string()));
            if repeated {
                tracing::trace!("Skipping repeated tool_call event for {}", call.id);
            } else {
                self.tool_calls.push(call);
            }
        }
    }

    pub fn finish(self, model: &str) -> ChatCompletion {
        let finish_reason = if self.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };
        ChatCompletion {
            id: completion_id(),
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant",
                    content: self.content,
                    reasoning_content: Some(self.reasoning).filter(|r| !r.is_empty()),
                    tool_calls: Some(self.tool_calls).filter(|c| !c.is_empty()),
                },
                finish_reason: finish_reason.to_string(),
            }],
        }
    }
}

/// Scan all of `reader` and assemble a completion. A fatal scan error ends
/// collection early; whatever was read before it is kept.
pub async fn collect_completion<R>(
    reader: R,
    model: &str,
    include_thinking: bool,
) -> ChatCompletion
where
    R: AsyncRead + Unpin,
{
    let mut scanner = EventScanner::new(reader);
    let mut accumulator = CompletionAccumulator::new(include_thinking);
    loop {
        match scanner.scan().await {
            Ok(Some(Scanned::Event(event))) => accumulator.push(&event),
            Ok(Some(Scanned::Skipped)) => {}
            Ok(Some(Scanned::Malformed(e))) => {
                tracing::debug!("Skipping malformed agent line: {}", e);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Agent output scan stopped: {}", e);
                break;
            }
        }
    }
    accumulator.finish(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_and_thinking_assembled() {
        let input = concat!(
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]}}"#,
            "\n",
            r#"{"type":"thinking","text":"pondering"}"#,
            "\n"
        );
        let completion = collect_completion(input.as_bytes(), "auto", true).await;
        let choice = &completion.choices[0];
        assert_eq!(choice.message.content, "Hello");
        assert_eq!(choice.message.reasoning_content.as_deref(), Some("pondering"));
        assert_eq!(choice.finish_reason, "stop");
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.model, "auto");
    }

    #[tokio::test]
    async fn test_cumulative_snapshots_are_not_duplicated() {
        let input = concat!(
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hel"}]}}"#,
            "\n",
            "garbage line\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]}}"#,
            "\n",
            r#"{"type":"result","subtype":"success"}"#,
            "\n"
        );
        let completion = collect_completion(input.as_bytes(), "auto", true).await;
        let message = &completion.choices[0].message;
        assert_eq!(message.content, "Hello");
        assert!(message.reasoning_content.is_none());
        assert!(message.tool_calls.is_none());

        let json = serde_json::to_value(&completion).unwrap();
        assert!(json["choices"][0]["message"].get("reasoning_content").is_none());
    }

    #[tokio::test]
    async fn test_tool_calls_collected() {
        let input = concat!(
            r#"{"type":"tool_call","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"ls"}}}}"#,
            "\n"
        );
        let completion = collect_completion(input.as_bytes(), "auto", true).await;
        let choice = &completion.choices[0];
        assert_eq!(choice.finish_reason, "tool_calls");
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "bash");
        assert_eq!(calls[0].function.arguments, r#"{"command":"ls"}"#);
    }

    #[tokio::test]
    async fn test_started_and_completed_events_yield_one_call() {
        let input = concat!(
            r#"{"type":"tool_call","subtype":"started","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"ls"}}}}"#,
            "\n",
            r#"{"type":"tool_call","subtype":"completed","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"ls"},"result":{"success":{}}}}}"#,
            "\n",
            r#"{"type":"tool_call","subtype":"started","call_id":"c2","tool_call":{"readToolCall":{"args":{"path":"a.txt"}}}}"#,
            "\n"
        );
        let completion = collect_completion(input.as_bytes(), "auto", true).await;
        let calls = completion.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].function.arguments, r#"{"command":"ls"}"#);
        assert_eq!(calls[1].id, "c2");
    }

    #[test]
    fn test_thinking_suppressed() {
        let mut accumulator = CompletionAccumulator::new(false);
        accumulator.push(&serde_json::from_str(r#"{"type":"thinking","text":"x"}"#).unwrap());
        let completion = accumulator.finish("auto");
        assert!(completion.choices[0].message.reasoning_content.is_none());
    }
}
