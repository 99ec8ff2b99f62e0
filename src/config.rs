//! Proxy configuration.
//!
//! Defaults, overlaid by `~/.openclaw/cursor-proxy.json` when present, then by
//! `OPENCLAW_CURSOR_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "OPENCLAW_CURSOR_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub log_level: String,
    /// Tool-call handling mode. Only `openclaw` is implemented.
    pub tool_mode: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    /// Explicit agent binary; empty means search PATH and common locations.
    pub cursor_agent_path: String,
    /// Used when a request leaves `model` empty.
    pub default_model: String,
    pub enable_thinking: bool,
    /// Upper bound for client-driven tool loops, for [`crate::tools::LoopGuard`] users.
    pub max_tool_loop_iterations: u32,
    /// Agent workspace; empty means the proxy's working directory.
    pub workspace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 32125,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            tool_mode: "openclaw".to_string(),
            timeout_ms: 300_000,
            retry_attempts: 3,
            cursor_agent_path: String::new(),
            default_model: "auto".to_string(),
            enable_thinking: true,
            max_tool_loop_iterations: 10,
            workspace: String::new(),
        }
    }
}

/// `~/.openclaw/cursor-proxy.json`
pub fn config_file_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".openclaw").join("cursor-proxy.json"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Defaults, the user config file, then the environment.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults overlaid with `path` if it exists. Fields missing from the
    /// file keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `OPENCLAW_CURSOR_*` overrides from `lookup`. Empty values are
    /// ignored, as are numbers that do not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(v) = var("PORT").and_then(|v| v.parse().ok()) {
            self.port = v;
        }
        if let Some(v) = var("HOST") {
            self.host = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("TOOL_MODE") {
            self.tool_mode = v;
        }
        if let Some(v) = var("TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeout_ms = v;
        }
        if let Some(v) = var("RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry_attempts = v;
        }
        if let Some(v) = var("CURSOR_AGENT_PATH") {
            self.cursor_agent_path = v;
        }
        if let Some(v) = var("DEFAULT_MODEL") {
            self.default_model = v;
        }
        if let Some(v) = var("ENABLE_THINKING") {
            self.enable_thinking = v == "true" || v == "1";
        }
        if let Some(v) = var("MAX_TOOL_LOOP_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.max_tool_loop_iterations = v;
        }
        if let Some(v) = var("WORKSPACE") {
            self.workspace = v;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured workspace with `~` expanded; `None` means current directory.
    pub fn workspace_dir(&self) -> Option<PathBuf> {
        (!self.workspace.is_empty()).then(|| expand_home(&self.workspace))
    }

    pub fn agent_path_override(&self) -> Option<PathBuf> {
        (!self.cursor_agent_path.is_empty()).then(|| expand_home(&self.cursor_agent_path))
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for talking to a running proxy.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
