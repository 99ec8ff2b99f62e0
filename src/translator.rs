//! OpenAI chat request to `cursor-agent` prompt text.
//!
//! The agent takes a single text prompt on stdin, so the whole conversation
//! (tool definitions, prior tool calls and their results) is flattened into
//! role-prefixed blocks separated by blank lines. The exact layout is what
//! the agent has been tuned against; keep it stable.

use std::collections::HashSet;

use crate::openai::{ChatCompletionRequest, ChatMessage};

const TOOLS_HEADER: &str = "SYSTEM: You have access to the following tools. When you need to use one, respond with a tool_call in the standard OpenAI format.\n\
Tool guidance (OpenClaw compatibility):\n\
- exec, shell → use bash for running commands\n\
- prefer write/edit for file changes; use bash for commands/tests\n\
- For browser, cron, gateway, web_search, web_fetch, message, nodes, sessions_*: output the tool_call; OpenClaw executes these.\n\n\
Available tools:\n";

const CONTINUE_INSTRUCTION: &str =
    "The above tool calls have been executed. Continue your response based on these results.";

const BLOCK_SEPARATOR: &str = "\n\n";

/// OpenClaw tool name to the agent's equivalent.
pub fn map_tool_name(name: &str) -> &str {
    match name.to_lowercase().as_str() {
        "exec" | "shell" => "bash",
        "apply_patch" => "edit",
        _ => name,
    }
}

/// Build the agent prompt for a chat request.
pub fn build_prompt(request: &ChatCompletionRequest) -> String {
    let mut blocks = Vec::new();

    if let Some(tools) = tools_block(request) {
        blocks.push(tools);
    }

    let mut has_tool_results = false;
    for message in &request.messages {
        let role = if message.role.is_empty() {
            "user"
        } else {
            message.role.as_str()
        };

        if role == "tool" {
            has_tool_results = true;
            blocks.push(tool_result_block(message));
            continue;
        }

        if role == "assistant" {
            if let Some(calls) = message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
                let mut block = String::from("ASSISTANT: ");
                let text = message.text_content();
                if !text.is_empty() {
                    block.push_str(&text);
                    block.push('\n');
                }
                let lines: Vec<String> = calls
                    .iter()
                    .map(|call| {
                        let args = if call.function.arguments.is_empty() {
                            "{}"
                        } else {
                            call.function.arguments.as_str()
                        };
                        format!(
                            "tool_call(id: {}, name: {}, args: {})",
                            call.id, call.function.name, args
                        )
                    })
                    .collect();
                block.push_str(&lines.join("\n"));
                blocks.push(block);
                continue;
            }
        }

        let text = message.text_content();
        if !text.is_empty() {
            blocks.push(format!("{}: {}", role.to_uppercase(), text));
        }
    }

    if has_tool_results {
        blocks.push(CONTINUE_INSTRUCTION.to_string());
    }

    blocks.join(BLOCK_SEPARATOR)
}

fn tools_block(request: &ChatCompletionRequest) -> Option<String> {
    let tools = request.tools.as_ref()?;
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for function in tools.iter().filter_map(|t| t.function.as_ref()) {
        let name = if function.name.is_empty() {
            "unknown"
        } else {
            function.name.as_str()
        };
        let mapped = map_tool_name(name);
        if !seen.insert(mapped.to_string()) {
            continue;
        }
        let description = if mapped != name {
            format!("[{}→{}] {}", name, mapped, function.description)
        } else {
            function.description.clone()
        };
        let parameters = function
            .parameters
            .as_ref()
            .map(|p| p.get())
            .unwrap_or("{}");
        lines.push(format!(
            "- {}: {}\n  Parameters: {}",
            mapped, description, parameters
        ));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("{}{}", TOOLS_HEADER, lines.join("\n")))
}

fn tool_result_block(message: &ChatMessage) -> String {
    let call_id = message
        .tool_call_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or("unknown");
    let mut body = message.text_content();
    if body.is_empty() {
        body = message.raw_content().to_string();
    }
    format!("TOOL_RESULT (call_id: {}): {}", call_id, body)
}
