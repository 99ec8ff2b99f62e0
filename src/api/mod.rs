//! HTTP API: OpenAI-compatible routes.

mod chat;
mod routes;

pub use routes::{router, serve, AppState, HealthResponse};
