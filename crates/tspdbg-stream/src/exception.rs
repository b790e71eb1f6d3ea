//! Runtime exception block reassembly and decoding.
//!
//! The interpreter reports a failure as an `execution-failed` element whose
//! `error` attribute holds the message followed by a traceback, with
//! newlines and tabs entity-encoded:
//!
//! ```text
//! <execution-failed error="[string &quot;main&quot;]:5: attempt to call a nil value&#10;stack traceback:&#10;&#9;[string &quot;main&quot;]:5: in main chunk&#10;&#9;[C]: in ?"/></dbg>
//! ```

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::entities::{decode_entities, raw_attribute};
use crate::error::DecodeError;
use crate::markers::{ContinuationFilter, Markers};
use crate::model::{ExceptionRecord, TraceEntry};
use crate::reassembler::BlockReassembler;

/// Lines between the description and the first trace entry.
const TRACE_FRAMING_LINES: usize = 1;

/// Matches the `:<line>:` position marker of a traceback line.
pub(crate) fn line_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(\d+):").expect("line marker regex is valid"))
}

fn chunk_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[string "[^"]*"\]"#).expect("chunk name regex is valid"))
}

/// Reassembles exception blocks split across chunks.
#[derive(Debug, Clone)]
pub struct ExceptionReassembler {
    blocks: BlockReassembler,
    continuation: ContinuationFilter,
    chunk_marker: String,
}

impl ExceptionReassembler {
    pub fn new(markers: &Markers) -> Self {
        Self {
            blocks: BlockReassembler::new(
                markers.exception_open.clone(),
                markers.exception_close.clone(),
            ),
            continuation: ContinuationFilter::new(&markers.continuation),
            chunk_marker: markers.exception_chunk_marker.clone(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.blocks.is_started()
    }

    pub fn is_completed(&self) -> bool {
        self.blocks.is_completed()
    }

    pub fn reset(&mut self) {
        self.blocks.reset();
        self.continuation.reset();
    }

    /// Feed a chunk; returns the record of the last exception it completed.
    pub fn push(&mut self, chunk: &str) -> Option<ExceptionRecord> {
        let chunk = self.continuation.filter(chunk);
        let mut latest = None;
        for block in self.blocks.push(&chunk) {
            match decode_exception(&block, &self.chunk_marker) {
                Ok(record) => latest = Some(record),
                Err(e) => warn!("Dropping undecodable exception block: {}", e),
            }
        }
        latest
    }
}

/// Decode a complete exception block into a description and trace.
pub fn decode_exception(block: &str, chunk_marker: &str) -> Result<ExceptionRecord, DecodeError> {
    let raw = raw_attribute(block, "error").ok_or(DecodeError::MissingAttribute {
        element: "execution-failed",
        attribute: "error",
    })?;

    let mut text = decode_entities(raw);
    if !chunk_marker.is_empty() {
        if let Some(cut) = text.find(chunk_marker) {
            text.truncate(cut);
        }
    }
    let text = text.replace(';', "");
    let text = chunk_name().replace_all(&text, "");

    let mut lines = text.lines();
    let description = lines
        .next()
        .map(|first| line_marker().replace_all(first, "").trim().to_string())
        .unwrap_or_default();

    let mut trace = Vec::new();
    for line in lines.skip(TRACE_FRAMING_LINES) {
        let Some(caps) = line_marker().captures(line) else {
            continue;
        };
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(line_number) = digits.as_str().parse() else {
            continue;
        };
        let after = &line[whole.end()..];
        let call_site = after
            .find("in ")
            .map(|i| after[i..].trim_end().to_string())
            .unwrap_or_default();
        trace.push(TraceEntry {
            level: trace.len() as u32,
            line: line_number,
            call_site,
        });
    }

    Ok(ExceptionRecord { description, trace })
}
