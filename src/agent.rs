//! `cursor-agent` subprocess supervision.
//!
//! One process per request. The prompt goes in on stdin from a background
//! task; stdout carries NDJSON events and stderr carries diagnostics. A
//! watchdog task owns the child and kills it when the deadline passes or the
//! process token is cancelled (client disconnect, [`AgentProcess::kill`], or
//! dropping the handle).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Executable name looked up on PATH.
pub const AGENT_BINARY: &str = "cursor-agent";

/// Process lifetime limit when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("cursor-agent not found in PATH or common locations")]
    BinaryNotFound,
    #[error("start cursor-agent: {0}")]
    Spawn(#[source] io::Error),
    #[error("{}", exit_message(.status, .stderr))]
    Exited { status: ExitStatus, stderr: String },
    #[error("cursor-agent timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("cursor-agent was killed")]
    Killed,
    #[error("cursor-agent I/O error: {0}")]
    Io(String),
}

/// Stderr is the useful part of a failed run; fall back to the exit status.
fn exit_message(status: &ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("cursor-agent exited with {}", status)
    } else {
        stderr.to_string()
    }
}

/// Candidate locations after PATH, in search order.
fn fallback_locations() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".local/bin").join(AGENT_BINARY));
    }
    candidates.push(PathBuf::from("/usr/local/bin").join(AGENT_BINARY));
    candidates
}

/// Locate the agent executable: the configured override, then PATH, then
/// `~/.local/bin` and `/usr/local/bin`.
pub fn find_binary(override_path: Option<&Path>) -> Result<PathBuf, AgentError> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Configured cursor-agent path {} does not exist, searching PATH",
            path.display()
        );
    }

    if let Ok(path) = which::which(AGENT_BINARY) {
        return Ok(path);
    }

    fallback_locations()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or(AgentError::BinaryNotFound)
}

/// Everything needed to start one agent run.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub model: String,
    pub prompt: String,
    /// Working directory passed as `--workspace`; current directory when unset.
    pub workspace: Option<PathBuf>,
    /// Whole-process deadline; [`DEFAULT_TIMEOUT`] when unset or zero.
    pub timeout: Option<Duration>,
    pub binary: Option<PathBuf>,
}

impl SpawnOptions {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    fn effective_timeout(&self) -> Duration {
        self.timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    fn effective_workspace(&self) -> PathBuf {
        self.workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Fixed non-interactive invocation.
pub fn agent_args(model: &str, workspace: &Path) -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--stream-partial-output".to_string(),
        // Skips the interactive workspace trust prompt.
        "--trust".to_string(),
        "--workspace".to_string(),
        workspace.display().to_string(),
        "--model".to_string(),
        model.to_string(),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited,
    Killed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited => write!(f, "exited"),
            ProcessState::Killed => write!(f, "killed"),
        }
    }
}

/// How the watchdog saw the process end.
#[derive(Debug, Clone)]
enum Outcome {
    Exited(ExitStatus),
    TimedOut(Duration),
    Killed,
    WaitFailed(String),
}

enum Trigger {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

async fn watch(mut child: Child, timeout: Duration, cancel: CancellationToken) -> Outcome {
    let trigger = tokio::select! {
        status = child.wait() => Trigger::Exited(status),
        _ = tokio::time::sleep(timeout) => Trigger::Deadline,
        _ = cancel.cancelled() => Trigger::Cancelled,
    };

    match trigger {
        Trigger::Exited(Ok(status)) => Outcome::Exited(status),
        Trigger::Exited(Err(e)) => Outcome::WaitFailed(e.to_string()),
        Trigger::Deadline => {
            tracing::warn!("cursor-agent exceeded {:?}, killing", timeout);
            if let Err(e) = child.kill().await {
                tracing::debug!("Kill after timeout failed: {}", e);
            }
            Outcome::TimedOut(timeout)
        }
        Trigger::Cancelled => {
            tracing::debug!("cursor-agent cancelled, killing");
            if let Err(e) = child.kill().await {
                tracing::debug!("Kill after cancel failed: {}", e);
            }
            Outcome::Killed
        }
    }
}

/// Handle to a running agent. Owns the output pipes and the process token.
#[derive(Debug)]
pub struct AgentProcess {
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    cancel: CancellationToken,
    outcome_rx: Option<oneshot::Receiver<Outcome>>,
    outcome: Option<Outcome>,
}

impl AgentProcess {
    /// Start the agent. The process is bound to a child of `parent`, so
    /// cancelling `parent` kills it; its own timeout applies regardless.
    pub fn spawn(options: SpawnOptions, parent: &CancellationToken) -> Result<Self, AgentError> {
        let binary = find_binary(options.binary.as_deref())?;
        let workspace = options.effective_workspace();
        let timeout = options.effective_timeout();

        let mut child = Command::new(&binary)
            .args(agent_args(&options.model, &workspace))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentError::Spawn)?;

        let pid = child.id();
        tracing::debug!(
            "Spawned {} (pid {:?}) model={} workspace={}",
            binary.display(),
            pid,
            options.model,
            workspace.display()
        );

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = options.prompt;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::debug!("Writing prompt to cursor-agent failed: {}", e);
                }
                // Dropping stdin closes the pipe.
            });
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let cancel = parent.child_token();
        let (tx, rx) = oneshot::channel();
        let watchdog_cancel = cancel.clone();
        tokio::spawn(async move {
            let outcome = watch(child, timeout, watchdog_cancel).await;
            let _ = tx.send(outcome);
        });

        Ok(Self {
            pid,
            stdout,
            stderr,
            cancel,
            outcome_rx: Some(rx),
            outcome: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Standard output; `None` once taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Standard error; `None` once taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the process to end. The first call releases the process
    /// token; later calls return the same result without waiting.
    pub async fn wait(&mut self) -> Result<ExitStatus, AgentError> {
        if self.outcome.is_none() {
            let outcome = match self.outcome_rx.take() {
                Some(rx) => rx.await.unwrap_or(Outcome::Killed),
                None => Outcome::Killed,
            };
            self.cancel.cancel();
            self.outcome = Some(outcome);
        }

        match &self.outcome {
            Some(Outcome::Exited(status)) => Ok(*status),
            Some(Outcome::TimedOut(timeout)) => Err(AgentError::TimedOut(*timeout)),
            Some(Outcome::WaitFailed(message)) => Err(AgentError::Io(message.clone())),
            Some(Outcome::Killed) | None => Err(AgentError::Killed),
        }
    }

    /// Kill the process. Safe to call repeatedly and after [`wait`](Self::wait).
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> ProcessState {
        match &self.outcome {
            Some(Outcome::Exited(_)) | Some(Outcome::WaitFailed(_)) => ProcessState::Exited,
            Some(Outcome::TimedOut(_)) | Some(Outcome::Killed) => ProcessState::Killed,
            None if self.cancel.is_cancelled() => ProcessState::Killed,
            None => ProcessState::Running,
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncReadExt;

    fn fake_agent(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("cursor-agent");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn options(binary: PathBuf) -> SpawnOptions {
        SpawnOptions {
            binary: Some(binary),
            workspace: Some(PathBuf::from("/tmp")),
            ..SpawnOptions::new("auto", "hello agent")
        }
    }

    #[test]
    fn test_agent_args() {
        assert_eq!(
            agent_args("sonnet-4.5", Path::new("/work")),
            vec![
                "--print",
                "--output-format",
                "stream-json",
                "--stream-partial-output",
                "--trust",
                "--workspace",
                "/work",
                "--model",
                "sonnet-4.5"
            ]
        );
    }

    #[test]
    fn test_find_binary_prefers_existing_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_agent(dir.path(), "exit 0");
        assert_eq!(find_binary(Some(&path)).unwrap(), path);
    }

    #[test]
    fn test_effective_defaults() {
        let opts = SpawnOptions::new("auto", "");
        assert_eq!(opts.effective_timeout(), DEFAULT_TIMEOUT);
        let opts = SpawnOptions {
            timeout: Some(Duration::ZERO),
            ..SpawnOptions::new("auto", "")
        };
        assert_eq!(opts.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_prompt_on_stdin_and_args_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_agent(dir.path(), r#"cat; echo "$@""#);
        let mut process = AgentProcess::spawn(options(binary), &CancellationToken::new()).unwrap();

        let mut out = String::new();
        process
            .take_stdout()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        assert!(out.starts_with("hello agent"));
        assert!(out.contains("--print --output-format stream-json --stream-partial-output --trust --workspace /tmp --model auto"));

        let status = process.wait().await.unwrap();
        assert!(status.success());
        assert_eq!(process.state(), ProcessState::Exited);

        // Kill after wait is a no-op, repeated waits return the cached result.
        process.kill();
        process.kill();
        assert!(process.wait().await.unwrap().success());
        assert_eq!(process.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_agent(dir.path(), "echo 'Error: not logged in' >&2; exit 3");
        let mut process = AgentProcess::spawn(options(binary), &CancellationToken::new()).unwrap();

        let mut err = String::new();
        process
            .take_stderr()
            .unwrap()
            .read_to_string(&mut err)
            .await
            .unwrap();
        assert_eq!(err.trim(), "Error: not logged in");

        let status = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_agent(dir.path(), "exec sleep 30");
        let opts = SpawnOptions {
            timeout: Some(Duration::from_millis(100)),
            ..options(binary)
        };
        let mut process = AgentProcess::spawn(opts, &CancellationToken::new()).unwrap();
        assert!(matches!(process.wait().await, Err(AgentError::TimedOut(_))));
        assert_eq!(process.state(), ProcessState::Killed);
    }

    #[tokio::test]
    async fn test_parent_cancel_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_agent(dir.path(), "exec sleep 30");
        let parent = CancellationToken::new();
        let mut process = AgentProcess::spawn(options(binary), &parent).unwrap();
        assert_eq!(process.state(), ProcessState::Running);

        parent.cancel();
        assert!(matches!(process.wait().await, Err(AgentError::Killed)));
        assert_eq!(process.state(), ProcessState::Killed);
    }

    #[test]
    fn test_exit_message() {
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 2"])
            .status()
            .unwrap();
        let err = AgentError::Exited {
            status,
            stderr: "  \n".to_string(),
        };
        assert!(err.to_string().starts_with("cursor-agent exited with"));
        let err = AgentError::Exited {
            status,
            stderr: "quota exceeded\n".to_string(),
        };
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
