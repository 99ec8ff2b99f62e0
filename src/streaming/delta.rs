//! Cumulative-snapshot to incremental-delta conversion.

/// Tracks the last text and thinking snapshots seen for one response.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    last_text: String,
    last_thinking: String,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta for a new cumulative text value.
    pub fn next_text(&mut self, value: &str) -> String {
        let delta = diff(&self.last_text, value);
        self.last_text = value.to_string();
        delta
    }

    /// Delta for a new cumulative thinking value.
    pub fn next_thinking(&mut self, value: &str) -> String {
        let delta = diff(&self.last_thinking, value);
        self.last_thinking = value.to_string();
        delta
    }

    pub fn reset(&mut self) {
        self.last_text.clear();
        self.last_thinking.clear();
    }
}

/// Suffix of `current` beyond `previous`, or all of `current` when it does
/// not extend `previous` (the upstream value was replaced).
fn diff(previous: &str, current: &str) -> String {
    if previous.is_empty() {
        return current.to_string();
    }
    current
        .strip_prefix(previous)
        .unwrap_or(current)
        .to_string()
}
