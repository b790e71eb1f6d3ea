//! Literal markers recognised on the debugger stream.
//!
//! Every substring the scanner and reassemblers match lives here so that a
//! protocol revision only needs a configuration change.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// The set of literal markers used on the debugger stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Name of the channel element wrapping every control payload.
    pub channel_tag: String,
    /// Interactive prompt printed by the debugger once it is ready.
    pub prompt: String,
    /// Continuation markers removed from every chunk before scanning.
    pub continuation: Vec<String>,
    /// Opening marker of a call-stack block.
    pub stack_open: String,
    /// Closing marker of a call-stack block.
    pub stack_close: String,
    /// Opening fragment of a runtime exception block.
    pub exception_open: String,
    /// Sentinel completing a runtime exception block.
    pub exception_close: String,
    /// Traceback text from which everything onward is discarded.
    pub exception_chunk_marker: String,
    /// Opening fragment of a set-variable error block.
    pub set_variable_open: String,
    /// Closing marker of a set-variable error block.
    pub set_variable_close: String,
    /// Elements that switch the scanner to verbatim output.
    pub resume_elements: Vec<String>,
    /// Fragments that keep a text node out of plain output.
    pub suppressed_fragments: Vec<String>,
    /// Marker announcing a new script session.
    pub session_begin: String,
    /// Marker announcing the end of a script session.
    pub session_end: String,
    /// Marker announcing that the script was aborted.
    pub script_aborted: String,
    /// Marker announcing a breakpoint stop.
    pub breakpoint_hit: String,
    /// Markers announcing a completed step.
    pub step_completed: Vec<String>,
    /// Markers announcing a completed variable assignment.
    pub variable_set: Vec<String>,
}

impl Markers {
    /// The channel opening tag, e.g. `<dbg>`.
    pub fn channel_open(&self) -> String {
        format!("<{}>", self.channel_tag)
    }

    /// The channel closing tag, e.g. `</dbg>`.
    pub fn channel_close(&self) -> String {
        format!("</{}>", self.channel_tag)
    }
}

/// Removes continuation markers from a chunked stream.
///
/// A marker may be split by a chunk boundary. When a chunk ends with the
/// first two or more bytes of a marker, those bytes are held back and
/// joined to the next chunk. A single trailing byte is passed through, and
/// the rest of the marker is dropped from the head of the next chunk.
#[derive(Debug, Clone, Default)]
pub struct ContinuationFilter {
    markers: Vec<String>,
    held: String,
    passed: String,
}

impl ContinuationFilter {
    pub fn new(markers: &[String]) -> Self {
        Self {
            markers: markers.iter().filter(|m| !m.is_empty()).cloned().collect(),
            held: String::new(),
            passed: String::new(),
        }
    }

    /// Strip markers from the next chunk.
    pub fn filter(&mut self, chunk: &str) -> String {
        let mut input = std::mem::take(&mut self.held);
        input.push_str(chunk);

        let lead = std::mem::take(&mut self.passed);
        let skip = if lead.is_empty() {
            0
        } else {
            self.markers
                .iter()
                .filter_map(|m| m.strip_prefix(lead.as_str()))
                .filter(|rest| !rest.is_empty() && input.starts_with(rest))
                .map(str::len)
                .max()
                .unwrap_or(0)
        };

        let mut text = strip_all(&input[skip..], &self.markers).into_owned();
        match self.partial_len(&text) {
            0 => {}
            1 => self.passed = text[text.len() - 1..].to_string(),
            len => self.held = text.split_off(text.len() - len),
        }
        text
    }

    /// Drop any carried marker fragment.
    pub fn reset(&mut self) {
        self.held.clear();
        self.passed.clear();
    }

    /// Length of the longest suffix of `text` that is a proper prefix of
    /// some marker.
    fn partial_len(&self, text: &str) -> usize {
        self.markers
            .iter()
            .flat_map(|m| {
                (1..m.len())
                    .filter(move |&n| m.is_char_boundary(n))
                    .map(move |n| &m[..n])
            })
            .filter(|prefix| text.ends_with(prefix))
            .map(str::len)
            .max()
            .unwrap_or(0)
    }
}

/// Remove every occurrence of each non-empty marker, in order.
pub(crate) fn strip_all<'a>(chunk: &'a str, markers: &[String]) -> Cow<'a, str> {
    if !markers
        .iter()
        .any(|m| !m.is_empty() && chunk.contains(m.as_str()))
    {
        return Cow::Borrowed(chunk);
    }
    let mut stripped = chunk.to_string();
    for marker in markers.iter().filter(|m| !m.is_empty()) {
        stripped = stripped.replace(marker.as_str(), "");
    }
    Cow::Owned(stripped)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            channel_tag: "dbg".into(),
            prompt: "TSP>".into(),
            continuation: strings(&["\n>>>>", ">>>>"]),
            stack_open: "<stacks>".into(),
            stack_close: "</stacks>".into(),
            exception_open: "<execution-failed".into(),
            exception_close: "</dbg>".into(),
            exception_chunk_marker: "[C]: in ?".into(),
            set_variable_open: "<SetVariable error".into(),
            set_variable_close: "/>".into(),
            resume_elements: strings(&["RESUME", "SESSION-BEGIN"]),
            suppressed_fragments: strings(&[
                "<stacks>",
                "</stacks>",
                "<globals>",
                "</globals>",
                "<locals>",
                "</locals>",
                "<upvalues>",
                "</upvalues>",
                "<watchpoints>",
                "</watchpoints>",
                "<dbg>",
                "</dbg>",
            ]),
            session_begin: "SESSION-BEGIN".into(),
            session_end: "session-end".into(),
            script_aborted: "Script aborted".into(),
            breakpoint_hit: "Application hit breakpoint".into(),
            step_completed: strings(&[
                "Application stepped over",
                "Application single stepped",
                "Application stepped out",
            ]),
            variable_set: strings(&[
                "Application set Local variable",
                "Application set Global variable",
                "Application set Up variable",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_tags_follow_name() {
        let markers = Markers {
            channel_tag: "kdbg".into(),
            ..Markers::default()
        };
        assert_eq!(markers.channel_open(), "<kdbg>");
        assert_eq!(markers.channel_close(), "</kdbg>");
    }

    fn filter() -> ContinuationFilter {
        ContinuationFilter::new(&Markers::default().continuation)
    }

    #[test]
    fn newline_prefixed_marker_is_removed_first() {
        assert_eq!(filter().filter("a\n>>>>b>>>>c"), "abc");
    }

    #[test]
    fn marker_split_in_half_is_removed() {
        let mut f = filter();
        assert_eq!(f.filter("value>>"), "value");
        assert_eq!(f.filter(">>next"), "next");
    }

    #[test]
    fn marker_split_after_first_byte_is_removed_from_next_chunk() {
        let mut f = filter();
        assert_eq!(f.filter("</dbg>"), "</dbg>");
        assert_eq!(f.filter(">>>more"), "more");
    }

    #[test]
    fn held_fragment_that_is_not_a_marker_is_released() {
        let mut f = filter();
        assert_eq!(f.filter("a >>"), "a ");
        assert_eq!(f.filter(" b"), ">> b");
    }

    #[test]
    fn reset_drops_carried_fragment() {
        let mut f = filter();
        f.filter("x>>>");
        f.reset();
        assert_eq!(f.filter(">rest"), ">rest");
    }

    #[test]
    fn strip_all_ignores_empty_markers() {
        let markers = vec![String::new(), "x".to_string()];
        assert_eq!(strip_all("axb", &markers), "ab");
    }
}
