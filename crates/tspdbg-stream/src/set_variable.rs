//! Set-variable error reassembly.
//!
//! Unlike the stack and exception reassemblers this one matches markers
//! against each chunk on its own rather than against a cumulative buffer.

use tracing::warn;

use crate::entities::{decode_entities, raw_attribute};
use crate::error::DecodeError;
use crate::exception::line_marker;
use crate::markers::{ContinuationFilter, Markers};

/// Per-chunk reassembler for `<SetVariable error="…"/>` blocks.
#[derive(Debug, Clone)]
pub struct SetVariableReassembler {
    open: String,
    close: String,
    continuation: ContinuationFilter,
    error_occurred: bool,
    end_reached: bool,
    buffer: String,
}

impl SetVariableReassembler {
    pub fn new(markers: &Markers) -> Self {
        Self {
            open: markers.set_variable_open.clone(),
            close: markers.set_variable_close.clone(),
            continuation: ContinuationFilter::new(&markers.continuation),
            error_occurred: false,
            end_reached: false,
            buffer: String::new(),
        }
    }

    /// Whether an error block has opened and not yet closed.
    pub fn is_started(&self) -> bool {
        self.error_occurred && !self.end_reached
    }

    pub fn reset(&mut self) {
        self.clear_block();
        self.continuation.reset();
    }

    fn clear_block(&mut self) {
        self.error_occurred = false;
        self.end_reached = false;
        self.buffer.clear();
    }

    /// Feed a chunk; returns the decoded error message when a block
    /// completes in it.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        let chunk = self.continuation.filter(chunk);

        let open = (!self.open.is_empty())
            .then(|| chunk.find(self.open.as_str()))
            .flatten();
        if let Some(start) = open {
            // A fresh open marker always restarts accumulation.
            let rest = &chunk[start..];
            match self.close_end(rest, self.open.len()) {
                Some(end) => {
                    let block = rest[..end].to_string();
                    return self.complete(&block);
                }
                None => {
                    self.buffer = rest.to_string();
                    self.error_occurred = true;
                    self.end_reached = false;
                    return None;
                }
            }
        }

        if !self.is_started() {
            return None;
        }
        match self.close_end(&chunk, 0) {
            Some(end) => {
                self.buffer.push_str(&chunk[..end]);
                self.end_reached = true;
                let block = std::mem::take(&mut self.buffer);
                self.complete(&block)
            }
            None => {
                self.buffer.push_str(&chunk);
                None
            }
        }
    }

    fn close_end(&self, text: &str, from: usize) -> Option<usize> {
        text[from..]
            .find(self.close.as_str())
            .map(|i| from + i + self.close.len())
    }

    fn complete(&mut self, block: &str) -> Option<String> {
        self.clear_block();
        match decode_set_variable_error(block) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Dropping undecodable set-variable block: {}", e);
                None
            }
        }
    }
}

/// Extract the error message from a complete set-variable block.
///
/// The chunk name and line prefix (`[string "main"]:1:`) are removed.
pub fn decode_set_variable_error(block: &str) -> Result<String, DecodeError> {
    let raw = raw_attribute(block, "error").ok_or(DecodeError::MissingAttribute {
        element: "SetVariable",
        attribute: "error",
    })?;
    let text = decode_entities(raw);
    let message = match line_marker().find(&text) {
        Some(m) => &text[m.end()..],
        None => text.as_str(),
    };
    Ok(message.trim().to_string())
}
