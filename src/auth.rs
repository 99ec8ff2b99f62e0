//! Cursor credential discovery.
//!
//! The proxy never handles credentials itself; `cursor-agent` does. We only
//! check whether a credential file exists so `/health` and `status` can say
//! whether requests are likely to succeed.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::agent;
use crate::config::Config;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_agent: Option<PathBuf>,
}

/// Credential files in priority order. `xdg_config_home` defaults to `~/.config`.
pub fn credential_paths(home: &Path, xdg_config_home: Option<&Path>) -> Vec<PathBuf> {
    let config_home = xdg_config_home
        .map(Path::to_path_buf)
        .unwrap_or_else(|| home.join(".config"));
    vec![
        home.join(".cursor").join("cli-config.json"),
        home.join(".cursor").join("auth.json"),
        config_home.join("cursor").join("cli-config.json"),
    ]
}

/// First existing credential file among `candidates`.
pub fn find_credentials(candidates: &[PathBuf]) -> AuthStatus {
    match candidates.iter().find(|p| p.exists()) {
        Some(path) => AuthStatus {
            authenticated: true,
            credential_path: Some(path.clone()),
            cursor_agent: None,
        },
        None => AuthStatus::default(),
    }
}

/// Check the standard credential locations for the current user.
pub fn verify_auth() -> AuthStatus {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return AuthStatus::default();
    };
    let xdg = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    find_credentials(&credential_paths(&home, xdg.as_deref()))
}

/// Credentials plus the resolved agent binary.
pub fn status(config: &Config) -> AuthStatus {
    let mut status = verify_auth();
    status.cursor_agent = agent::find_binary(config.agent_path_override().as_deref()).ok();
    status
}
