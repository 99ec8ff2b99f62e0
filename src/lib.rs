//! # openclaw-cursor
//!
//! An OpenAI-compatible chat-completions proxy backed by the `cursor-agent`
//! CLI, so OpenClaw (or any OpenAI client) can use Cursor models.
//!
//! ## Request Flow
//!
//! ```text
//!   POST /v1/chat/completions
//!            │
//!            ▼
//!   ┌──────────────────┐   prompt on stdin   ┌──────────────────┐
//!   │  translator      │ ──────────────────▶ │  cursor-agent    │
//!   │  (messages+tools)│                     │  (one per req)   │
//!   └──────────────────┘                     └────────┬─────────┘
//!                                                     │ NDJSON on stdout
//!                                                     ▼
//!                                           ┌──────────────────┐
//!                                           │  streaming       │
//!                                           │  scan → delta →  │
//!                                           │  chunk / batch   │
//!                                           └──────────────────┘
//! ```
//!
//! ## Modules
//! - `api`: axum router, chat/models/health handlers
//! - `agent`: subprocess spawn, timeout and cancellation
//! - `streaming`: NDJSON scanner, delta tracking, OpenAI chunk conversion
//! - `translator`: OpenAI request to agent prompt
//! - `tools`: tool-call name normalization and the repeat guard
//! - `error`: error classification and retry
//! - `models`, `auth`, `config`, `logging`: supporting pieces

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod openai;
pub mod streaming;
pub mod tools;
pub mod translator;

pub use config::Config;
pub use error::{ErrorKind, ParsedError};
pub use models::ModelRegistry;
