//! Router, shared state and the small read-only endpoints.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent;
use crate::auth;
use crate::config::Config;
use crate::models::ModelRegistry;
use crate::openai::ModelList;

use super::chat;

/// Request bodies carry whole conversations; allow more than axum's 2 MiB default.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state. Read-only after startup.
pub struct AppState {
    pub config: Config,
    pub models: ModelRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            models: ModelRegistry::builtin(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cursor_agent: &'static str,
    pub authenticated: bool,
    pub proxy_version: &'static str,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config));
    tracing::info!("Loaded {} Cursor models", state.models.len());

    match agent::find_binary(state.config.agent_path_override().as_deref()) {
        Ok(path) => tracing::info!("Using cursor-agent at {}", path.display()),
        Err(e) => tracing::warn!("{}; chat requests will fail until it is installed", e),
    }
    if !auth::verify_auth().authenticated {
        tracing::warn!("No Cursor credentials found; run `cursor-agent login`");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Proxy stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let available = agent::find_binary(state.config.agent_path_override().as_deref()).is_ok();
    Json(HealthResponse {
        status: "healthy",
        cursor_agent: if available { "available" } else { "unavailable" },
        authenticated: auth::verify_auth().authenticated,
        proxy_version: env!("CARGO_PKG_VERSION"),
    })
}

/// List models in OpenAI format.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(state.models.list_openai())
}
