//! Streaming sentinel parser for sandbox stdout.
//!
//! Chunks arrive in arbitrary splits; the scanner reassembles lines in a
//! rolling buffer and extracts protocol events. Parsing is purely
//! synchronous (no suspension ever happens inside the scanner) and
//! consumed sentinels are dropped from the buffer so they cannot
//! re-trigger.

use crate::protocol::{ERROR_SENTINEL, FINAL_SENTINEL, TOOL_REQUEST_SENTINEL};

/// One protocol event extracted from stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A tool request with the given id is ready for dispatch.
    ToolRequest(String),
    /// The program finished; payload is the JSON-encoded result.
    Final(String),
    /// The program failed; payload is the JSON `{"message": ...}` object.
    ErrorReport(String),
}

/// Line-oriented scanner over the sandbox's stdout stream.
///
/// Request sentinels are only honored when their id carries this execution's
/// nonce prefix; agent code printing a guessed sentinel line is treated as
/// ordinary output.
#[derive(Debug)]
pub struct StdoutScanner {
    nonce: String,
    buffer: String,
}

impl StdoutScanner {
    pub fn new(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            buffer: String::new(),
        }
    }

    /// Feed one chunk; returns the events completed by it, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the unterminated tail as if it were a complete line. Called
    /// once when the stream ends, so a final sentinel without a trailing
    /// newline is still honored.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let tail = std::mem::take(&mut self.buffer);
        self.parse_line(tail.trim_end_matches(['\n', '\r']))
            .into_iter()
            .collect()
    }

    /// Extract the earliest sentinel on the line, if any. Text before the
    /// marker (an unflushed partial write from the agent) is ignored.
    fn parse_line(&self, line: &str) -> Option<StreamEvent> {
        let candidates = [
            (line.find(TOOL_REQUEST_SENTINEL), Marker::Request),
            (line.find(FINAL_SENTINEL), Marker::Final),
            (line.find(ERROR_SENTINEL), Marker::Error),
        ];
        let (at, marker) = candidates
            .into_iter()
            .filter_map(|(at, marker)| at.map(|at| (at, marker)))
            .min_by_key(|&(at, _)| at)?;

        match marker {
            Marker::Request => {
                let id = &line[at + TOOL_REQUEST_SENTINEL.len()..];
                if id.starts_with(self.nonce.as_str()) && !id.is_empty() {
                    Some(StreamEvent::ToolRequest(id.to_string()))
                } else {
                    tracing::debug!(id, "dropping request sentinel without execution nonce");
                    None
                }
            }
            Marker::Final => Some(StreamEvent::Final(
                line[at + FINAL_SENTINEL.len()..].to_string(),
            )),
            Marker::Error => Some(StreamEvent::ErrorReport(
                line[at + ERROR_SENTINEL.len()..].to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy)]
enum Marker {
    Request,
    Final,
    Error,
}

// =============================================================================
// Tests
// =============================================================================
