//! Agent NDJSON stream handling.
//!
//! `cursor-agent --output-format stream-json` writes one JSON event per line.
//! This module reads those lines ([`scanner`]), turns cumulative text
//! snapshots into deltas ([`delta`]), and renders OpenAI-shaped output either
//! as chunk events ([`sse`]) or as one batched completion ([`accumulate`]).

pub mod accumulate;
pub mod delta;
pub mod scanner;
pub mod sse;
pub mod types;

pub use accumulate::{collect_completion, CompletionAccumulator};
pub use delta::DeltaTracker;
pub use scanner::{EventScanner, ScanError, Scanned, INITIAL_BUFFER_SIZE, MAX_LINE_SIZE};
pub use sse::{completion_id, Converter, DONE_PAYLOAD};
pub use types::{EventKind, StreamContent, StreamEvent, StreamMessage, ToolCallPayload};
