//! Line-oriented reader for the agent's NDJSON output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::types::StreamEvent;

/// Initial read buffer size.
pub const INITIAL_BUFFER_SIZE: usize = 64 * 1024;
/// Hard cap on a single line.
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Errors that end a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("failed to read agent output: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of scanning one line.
#[derive(Debug)]
pub enum Scanned {
    Event(StreamEvent),
    /// Blank line or a document without a `type`.
    Skipped,
    /// The line was not valid JSON; scanning may continue.
    Malformed(serde_json::Error),
}

/// Reads [`StreamEvent`]s from a byte stream, one JSON document per line.
pub struct EventScanner<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> EventScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(INITIAL_BUFFER_SIZE, reader),
            line: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            finished: false,
        }
    }

    /// Next line's outcome, `Ok(None)` at end of input. After an error the
    /// scanner is finished and keeps returning `Ok(None)`.
    pub async fn scan(&mut self) -> Result<Option<Scanned>, ScanError> {
        if self.finished {
            return Ok(None);
        }
        match self.read_line().await {
            Ok(true) => Ok(Some(parse_line(&self.line))),
            Ok(false) => {
                self.finished = true;
                Ok(None)
            }
            Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    /// Fill `self.line` with the next line, without its terminator.
    async fn read_line(&mut self) -> Result<bool, ScanError> {
        self.line.clear();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                // A final unterminated line still counts.
                return Ok(!self.line.is_empty());
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let end = newline.unwrap_or(available.len());
            if self.line.len() + end > MAX_LINE_SIZE {
                return Err(ScanError::LineTooLong {
                    limit: MAX_LINE_SIZE,
                });
            }
            self.line.extend_from_slice(&available[..end]);

            let consumed = newline.map(|pos| pos + 1).unwrap_or(end);
            self.reader.consume(consumed);

            if newline.is_some() {
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                return Ok(true);
            }
        }
    }
}

/// Parse one line of agent output.
pub fn parse_line(line: &[u8]) -> Scanned {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Scanned::Skipped;
    }
    match serde_json::from_slice::<StreamEvent>(line) {
        Ok(event) if event.event_type.is_empty() => Scanned::Skipped,
        Ok(event) => Scanned::Event(event),
        Err(err) => Scanned::Malformed(err),
    }
}
