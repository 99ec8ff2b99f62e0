//! Error taxonomy for agent failures and the retry policy built on it.
//!
//! Diagnostic text coming out of `cursor-agent` (usually its stderr) is
//! classified into a small, stable set of kinds. Each kind knows whether a
//! retry could help and how it should be rendered to an OpenAI client.

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Stable error categories surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    QuotaExceeded,
    AuthFailed,
    ModelUnavailable,
    NetworkError,
    InvalidRequest,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// HTTP status used when this kind is returned to a client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::ModelUnavailable => StatusCode::NOT_FOUND,
            ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified agent failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ParsedError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    pub suggestion: Option<String>,
}

impl ParsedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: false,
            suggestion: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelUnavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }

    fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    /// Message shown to clients, with the suggestion appended when present.
    pub fn client_message(&self) -> String {
        match &self.suggestion {
            Some(suggestion) => format!("{}. {}", self.message, suggestion),
            None => self.message.clone(),
        }
    }

    /// OpenAI-shaped error body.
    pub fn to_openai(&self) -> OpenAiErrorResponse {
        OpenAiErrorResponse {
            error: OpenAiErrorBody {
                message: self.client_message(),
                error_type: self.kind.as_str().to_string(),
                code: self.kind.as_str().to_string(),
            },
        }
    }
}

impl IntoResponse for ParsedError {
    fn into_response(self) -> Response {
        (self.kind.status_code(), Json(self.to_openai())).into_response()
    }
}

/// `{"error": {...}}` envelope used by the OpenAI API.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiErrorResponse {
    pub error: OpenAiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI regex"))
}

/// Remove terminal color escapes.
pub fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify raw diagnostic text. First matching keyword set wins.
pub fn classify(diagnostic: &str) -> ParsedError {
    let text = strip_ansi(diagnostic).to_lowercase();

    if contains_any(&text, &["usage limit", "quota", "exceeded"]) {
        return ParsedError::new(
            ErrorKind::QuotaExceeded,
            "Cursor quota exceeded. Check cursor.com/settings",
        )
        .with_suggestion("Check your Cursor subscription and usage at cursor.com/settings");
    }
    if contains_any(
        &text,
        &["not logged in", "auth", "unauthorized", "authentication failed"],
    ) {
        return ParsedError::new(ErrorKind::AuthFailed, "Cursor authentication invalid")
            .with_suggestion("Run: cursor-agent login");
    }
    if contains_any(
        &text,
        &["model not found", "invalid model", "cannot use this model"],
    ) {
        return ParsedError::new(
            ErrorKind::ModelUnavailable,
            "Model not available in your Cursor plan",
        );
    }
    if contains_any(
        &text,
        &["econnrefused", "connection refused", "network", "fetch failed"],
    ) {
        return ParsedError::new(
            ErrorKind::NetworkError,
            "Network error connecting to Cursor API",
        )
        .with_suggestion("Check your internet connection and try again")
        .recoverable();
    }

    ParsedError::unknown(diagnostic.trim())
}

/// Bounded exponential backoff for recoverable failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default 1s initial backoff. Zero attempts means the default of 3.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 3 } else { max_attempts },
            ..Self::default()
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(ParsedError),
}

impl From<RetryError> for ParsedError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled => ParsedError::unknown("request cancelled"),
            RetryError::Failed(parsed) => parsed,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-recoverable error, or
/// runs out of attempts. Cancellation is observed before every attempt and
/// during every backoff wait.
pub async fn retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Agent run succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let parsed = classify(&err.to_string());
        if !parsed.recoverable || attempt + 1 == max_attempts {
            if attempt > 0 {
                tracing::error!("Agent run failed after {} retries: {}", attempt, parsed);
            }
            return Err(RetryError::Failed(parsed));
        }

        tracing::warn!(
            "Attempt {} failed with {}, retrying in {:?}",
            attempt + 1,
            parsed.kind,
            backoff
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff *= 2;
    }

    Err(RetryError::Cancelled)
}
