//! `POST /v1/chat/completions`.
//!
//! Streaming requests are bound to the client connection: when the SSE
//! stream is dropped the agent is killed. Batched requests run on a detached
//! task under the retry policy, so a client that gives up early does not
//! abort a long agent run halfway.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::Stream;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentError, AgentProcess, SpawnOptions};
use crate::error::{classify, retry, ParsedError, RetryPolicy};
use crate::openai::{ChatCompletion, ChatCompletionRequest};
use crate::streaming::{collect_completion, Converter, EventScanner, Scanned, DONE_PAYLOAD};
use crate::translator::build_prompt;

use super::routes::AppState;

pub async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejecting chat request: {}", e);
            return ParsedError::invalid_request("Invalid JSON body").into_response();
        }
    };

    let config = &state.config;
    let requested = if request.model.trim().is_empty() {
        config.default_model.as_str()
    } else {
        request.model.as_str()
    };
    let model = match state.models.resolve(requested) {
        Ok(model) => model.id.clone(),
        Err(e) => return ParsedError::model_unavailable(e.to_string()).into_response(),
    };

    let options = SpawnOptions {
        model: model.clone(),
        prompt: build_prompt(&request),
        workspace: config.workspace_dir(),
        timeout: Some(config.request_timeout()),
        binary: config.agent_path_override(),
    };
    let include_thinking = config.enable_thinking;

    tracing::info!(
        "Chat completion: model={} messages={} stream={}",
        model,
        request.messages.len(),
        request.is_stream()
    );

    if request.is_stream() {
        match stream_completion(options, model, include_thinking) {
            Ok(sse) => sse.into_response(),
            Err(e) => {
                let parsed = classify(&e.to_string());
                tracing::warn!("Failed to start cursor-agent: {}", parsed);
                parsed.into_response()
            }
        }
    } else {
        let policy = RetryPolicy::new(config.retry_attempts);
        let task = tokio::spawn(batched_completion(options, model, include_thinking, policy));
        match task.await {
            Ok(Ok(completion)) => Json(completion).into_response(),
            Ok(Err(parsed)) => {
                tracing::warn!("Chat completion failed: {}", parsed);
                parsed.into_response()
            }
            Err(e) => {
                tracing::error!("Chat completion task failed: {}", e);
                ParsedError::unknown(format!("agent task failed: {}", e)).into_response()
            }
        }
    }
}

/// Spawn the agent and relay its events as chunk events, ending with `[DONE]`.
fn stream_completion(
    options: SpawnOptions,
    model: String,
    include_thinking: bool,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AgentError> {
    let cancel = CancellationToken::new();
    let mut process = AgentProcess::spawn(options, &cancel)?;
    let stdout = process.take_stdout();

    // Undrained stderr can fill the pipe and stall the agent.
    if let Some(mut stderr) = process.take_stderr() {
        tokio::spawn(async move {
            let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
        });
    }

    // Dropping the stream (client disconnect) cancels the token and kills the agent.
    let guard = cancel.drop_guard();

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut converter = Converter::new(model).with_thinking(include_thinking);

        if let Some(stdout) = stdout {
            let mut scanner = EventScanner::new(stdout);
            loop {
                match scanner.scan().await {
                    Ok(Some(Scanned::Event(event))) => {
                        let Some(chunk) = converter.convert(&event) else {
                            continue;
                        };
                        match Event::default().json_data(&chunk) {
                            Ok(sse_event) => {
                                yield Ok(sse_event);
                            }
                            Err(e) => tracing::warn!("Failed to encode chunk: {}", e),
                        }
                    }
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
        }

        yield Ok(Event::default().data(DONE_PAYLOAD));

        match process.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!("Stream {} complete", converter.id());
            }
            Ok(status) => tracing::warn!("cursor-agent exited with {} during stream", status),
            Err(e) => tracing::warn!("Stream ended abnormally: {}", e),
        }
    };

    Ok(Sse::new(stream))
}

/// Run the agent to completion, retrying recoverable failures.
async fn batched_completion(
    options: SpawnOptions,
    model: String,
    include_thinking: bool,
    policy: RetryPolicy,
) -> Result<ChatCompletion, ParsedError> {
    let cancel = CancellationToken::new();
    retry(&cancel, &policy, || {
        run_agent(options.clone(), model.clone(), include_thinking)
    })
    .await
    .map_err(ParsedError::from)
}

async fn run_agent(
    options: SpawnOptions,
    model: String,
    include_thinking: bool,
) -> Result<ChatCompletion, AgentError> {
    let mut process = AgentProcess::spawn(options, &CancellationToken::new())?;
    let stdout = process.take_stdout();
    let stderr = process.take_stderr();

    let collect = async {
        match stdout {
            Some(stdout) => Some(collect_completion(stdout, &model, include_thinking).await),
            None => None,
        }
    };
    let drain = async {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_string(&mut text).await {
                tracing::debug!("Reading cursor-agent stderr failed: {}", e);
            }
        }
        text
    };
    let (completion, stderr) = tokio::join!(collect, drain);

    let status = process.wait().await?;
    if !status.success() {
        return Err(AgentError::Exited { status, stderr });
    }
    completion.ok_or_else(|| AgentError::Io("stdout not captured".to_string()))
}
