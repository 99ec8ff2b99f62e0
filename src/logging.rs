//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Set to `true` to disable log output entirely.
pub const SILENT_ENV: &str = "OPENCLAW_CURSOR_LOG_SILENT";

/// Install a stderr fmt subscriber. `RUST_LOG` takes precedence over `level`;
/// an unrecognized level falls back to `info`.
pub fn init(level: &str) {
    if std::env::var(SILENT_ENV).map(|v| v == "true").unwrap_or(false) {
        return;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(directive(level)))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Map a config log level to a filter directive for this crate and its HTTP layer.
fn directive(level: &str) -> String {
    let level = match level.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        "trace" => "trace",
        _ => "info",
    };
    format!("{level},openclaw_cursor={level},tower_http={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive() {
        assert_eq!(directive("debug"), "debug,openclaw_cursor=debug,tower_http=debug");
        assert_eq!(directive("WARN"), "warn,openclaw_cursor=warn,tower_http=warn");
        assert_eq!(directive("loud"), "info,openclaw_cursor=info,tower_http=info");
    }
}
