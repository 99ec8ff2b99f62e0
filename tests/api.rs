use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use openclaw_cursor::api::{router, AppState};
use openclaw_cursor::Config;

fn app(config: Config) -> Router {
    router(Arc::new(AppState::new(config)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_chat(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_status() {
    let (status, _, body) = send(app(Config::default()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["proxy_version"], env!("CARGO_PKG_VERSION"));
    assert!(json["authenticated"].is_boolean());
    let agent = json["cursor_agent"].as_str().unwrap();
    assert!(agent == "available" || agent == "unavailable");
}

#[tokio::test]
async fn models_listed_in_openai_format() {
    let (status, _, body) = send(app(Config::default()), get("/v1/models")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["object"], "list");
    let data = json["data"].as_array().unwrap();
    assert!(data.iter().any(|m| m["id"] == "auto"));
    assert!(data.iter().all(|m| m["owned_by"] == "cursor"));
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    let (status, _, body) = send(app(Config::default()), post_chat("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"]["type"], "invalid_request");
    assert_eq!(json["error"]["code"], "invalid_request");
    assert_eq!(json["error"]["message"], "Invalid JSON body");
}

#[cfg(unix)]
mod fake_agent {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    const HELLO_EVENTS: &str = r#"{"type":"system","subtype":"init"}

{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hel"}]}}
not json at all
{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]}}
{"type":"thinking","text":"pondering"}
{"type":"result","subtype":"success"}"#;

    /// Script that records its stdin and arguments, then prints `stdout`.
    fn write_agent(dir: &Path, stdout: &str, stderr: &str, exit_code: i32) -> PathBuf {
        let path = dir.join("cursor-agent");
        let script = format!(
            "#!/bin/sh\ncat > '{dir}/prompt.txt'\necho \"$@\" > '{dir}/args.txt'\ncat <<'EOF_OUT'\n{stdout}\nEOF_OUT\nprintf '%s' '{stderr}' >&2\nexit {exit_code}\n",
            dir = dir.display(),
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn config(agent: &Path, workspace: &Path) -> Config {
        Config {
            cursor_agent_path: agent.display().to_string(),
            workspace: workspace.display().to_string(),
            retry_attempts: 1,
            timeout_ms: 10_000,
            ..Config::default()
        }
    }

    fn chat_body(model: &str, stream: bool) -> String {
        json!({
            "model": model,
            "stream": stream,
            "messages": [{"role": "user", "content": "Hello"}],
        })
        .to_string()
    }

    #[tokio::test]
    async fn unknown_model_never_spawns_agent() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), "", "", 0);
        let (status, _, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("cursor/unknown-model", false)),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["type"], "model_unavailable");
        assert_eq!(
            json["error"]["message"],
            r#"unknown model "cursor/unknown-model""#
        );
        assert!(!dir.path().join("args.txt").exists());
    }

    #[tokio::test]
    async fn batched_completion_assembles_message() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), HELLO_EVENTS, "", 0);
        let (status, content_type, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("cursor/auto", false)),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["model"], "auto");
        assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
        let choice = &json["choices"][0];
        assert_eq!(choice["message"]["role"], "assistant");
        assert_eq!(choice["message"]["content"], "Hello");
        assert_eq!(choice["message"]["reasoning_content"], "pondering");
        assert_eq!(choice["finish_reason"], "stop");

        let prompt = std::fs::read_to_string(dir.path().join("prompt.txt")).unwrap();
        assert_eq!(prompt, "USER: Hello");
        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(
            args.trim(),
            format!(
                "--print --output-format stream-json --stream-partial-output --trust --workspace {} --model auto",
                dir.path().display()
            )
        );
    }

    #[tokio::test]
    async fn empty_model_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), HELLO_EVENTS, "", 0);
        let mut config = config(&agent, dir.path());
        config.default_model = "sonnet-4.5".to_string();
        let (status, _, body) = send(app(config), post_chat(chat_body("", false))).await;

        assert_eq!(status, StatusCode::OK, "{}", body);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["model"], "sonnet-4.5");
    }

    #[tokio::test]
    async fn streaming_completion_emits_chunks_then_done() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), HELLO_EVENTS, "ignored diagnostics", 0);
        let (status, content_type, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("cursor-acp/sonnet-4.5", true)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/event-stream"));
        assert!(body.ends_with("data: [DONE]\n\n"));
        assert_eq!(body.matches("data: [DONE]").count(), 1);

        let chunks: Vec<Value> = body
            .split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .filter(|data| *data != "[DONE]")
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "lo");
        assert_eq!(chunks[2]["choices"][0]["delta"]["reasoning_content"], "pondering");
        assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
        assert!(chunks.iter().all(|c| c["model"] == "sonnet-4.5"));
        assert!(chunks.iter().all(|c| c["id"] == chunks[0]["id"]));
    }

    #[tokio::test]
    async fn streaming_tool_call_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let events = r#"{"type":"tool_call","subtype":"started","call_id":"call_1","tool_call":{"shellToolCall":{"args":{"command":"ls"}}}}"#;
        let agent = write_agent(dir.path(), events, "", 0);
        let (_, _, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("auto", true)),
        )
        .await;

        let first = body.split("\n\n").next().unwrap();
        let chunk: Value = serde_json::from_str(first.strip_prefix("data: ").unwrap()).unwrap();
        let call = &chunk["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["index"], 0);
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "bash");
        assert_eq!(call["function"]["arguments"], r#"{"command":"ls"}"#);
    }

    #[tokio::test]
    async fn batched_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), "", "Error: You have hit your usage limit", 1);
        let (status, _, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("auto", false)),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["type"], "quota_exceeded");
        assert_eq!(
            json["error"]["message"],
            "Cursor quota exceeded. Check cursor.com/settings. Check your Cursor subscription and usage at cursor.com/settings"
        );
    }

    #[tokio::test]
    async fn batched_failure_without_stderr_names_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let agent = write_agent(dir.path(), "", "", 2);
        let (status, _, body) = send(
            app(config(&agent, dir.path())),
            post_chat(chat_body("auto", false)),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["type"], "unknown");
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("cursor-agent exited with"), "{}", message);
    }
}
