//! Incremental tag scanner separating program output from control tags.
//!
//! The scanner is re-entered with every chunk. A tag that is cut off by a
//! chunk boundary is carried over and completed by the next call, so tag
//! names and attribute values may be split anywhere.

use crate::markers::{ContinuationFilter, Markers};

/// Longest tag carried over between chunks before its `<` is taken as text.
const MAX_PENDING_TAG: usize = 64 * 1024;

/// Kind of a complete tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
    /// Comments, declarations and processing instructions.
    Other,
}

/// Whether the text after a `<` starts a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagStart {
    Yes,
    No,
    /// The `<` is the last character seen so far.
    Unknown,
}

/// Where the tag at the start of some text ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagEnd {
    At(usize),
    /// Another unquoted `<` came first.
    NotATag,
    Incomplete,
}

/// Scanner state carried across chunks.
#[derive(Debug, Clone)]
pub struct TagScanner {
    channel_tag: String,
    continuation: ContinuationFilter,
    resume_elements: Vec<String>,
    suppressed_fragments: Vec<String>,
    inside_channel: bool,
    tag_count: usize,
    output_resumed: bool,
    /// Incomplete tag text awaiting the rest of its characters.
    pending: String,
}

impl TagScanner {
    /// Create a scanner for the given stream markers.
    pub fn new(markers: &Markers) -> Self {
        Self {
            channel_tag: markers.channel_tag.clone(),
            continuation: ContinuationFilter::new(&markers.continuation),
            resume_elements: markers.resume_elements.clone(),
            suppressed_fragments: markers.suppressed_fragments.clone(),
            inside_channel: false,
            tag_count: 0,
            output_resumed: false,
            pending: String::new(),
        }
    }

    /// Whether a channel open tag has been seen without its close.
    pub fn inside_channel(&self) -> bool {
        self.inside_channel
    }

    /// Current element nesting depth; 1 is the channel's top level.
    pub fn tag_count(&self) -> usize {
        self.tag_count
    }

    /// Whether output has been resumed inside the current channel element.
    pub fn output_resumed(&self) -> bool {
        self.output_resumed
    }

    /// Scan the next chunk and return its plain-output portion.
    pub fn scan(&mut self, chunk: &str) -> String {
        let chunk = self.continuation.filter(chunk);
        if chunk.is_empty() {
            return String::new();
        }

        let mut input = std::mem::take(&mut self.pending);
        input.push_str(&chunk);

        let mut out = String::new();
        let mut rest = input.as_str();
        while let Some(lt) = rest.find('<') {
            let (text, tail) = rest.split_at(lt);
            self.on_text(text, &mut out);
            match tag_start(tail) {
                TagStart::Unknown => {
                    self.pending = tail.to_string();
                    return out;
                }
                TagStart::No => {
                    self.on_text("<", &mut out);
                    rest = &tail[1..];
                }
                TagStart::Yes => match tag_end(tail) {
                    TagEnd::At(end) => {
                        self.on_tag(&tail[..=end]);
                        rest = &tail[end + 1..];
                    }
                    TagEnd::Incomplete if tail.len() <= MAX_PENDING_TAG => {
                        self.pending = tail.to_string();
                        return out;
                    }
                    TagEnd::Incomplete | TagEnd::NotATag => {
                        self.on_text("<", &mut out);
                        rest = &tail[1..];
                    }
                },
            }
        }
        self.on_text(rest, &mut out);
        out
    }

    fn at_top_level(&self) -> bool {
        if self.inside_channel {
            self.tag_count == 1
        } else {
            self.tag_count == 0
        }
    }

    fn on_text(&self, text: &str, out: &mut String) {
        if text.is_empty() {
            return;
        }
        if self.output_resumed {
            out.push_str(text);
            return;
        }
        let suppressed = self
            .suppressed_fragments
            .iter()
            .any(|f| !f.is_empty() && text.contains(f.as_str()));
        if self.at_top_level() && !suppressed {
            out.push_str(text);
        }
    }

    fn on_tag(&mut self, raw: &str) {
        let (kind, name) = classify(raw);
        let is_channel = name == self.channel_tag;
        match kind {
            TagKind::Open if is_channel && !self.inside_channel => {
                self.inside_channel = true;
                self.tag_count = 1;
                self.output_resumed = false;
            }
            TagKind::Close if is_channel && self.inside_channel && self.tag_count <= 1 => {
                self.inside_channel = false;
                self.tag_count = 0;
                self.output_resumed = false;
            }
            TagKind::Open => self.tag_count += 1,
            TagKind::Close => {
                let floor = usize::from(self.inside_channel);
                self.tag_count = self.tag_count.saturating_sub(1).max(floor);
            }
            TagKind::SelfClosing | TagKind::Other => {}
        }
        if self.inside_channel && self.resume_elements.iter().any(|r| r == name) {
            self.output_resumed = true;
        }
    }
}

fn tag_start(tail: &str) -> TagStart {
    match tail[1..].chars().next() {
        None => TagStart::Unknown,
        Some(c) if c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?') => TagStart::Yes,
        Some(_) => TagStart::No,
    }
}

/// Find the `>` closing the tag at the start of `tag`.
///
/// Quotes only delimit a value directly after `=`; a `>` inside such a
/// value does not close the tag.
fn tag_end(tag: &str) -> TagEnd {
    let mut quote: Option<char> = None;
    let mut after_equals = false;
    for (i, c) in tag.char_indices().skip(1) {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '>' => return TagEnd::At(i),
                '<' => return TagEnd::NotATag,
                '"' | '\'' if after_equals => quote = Some(c),
                _ => {}
            },
        }
        if quote.is_none() && !c.is_whitespace() {
            after_equals = c == '=';
        }
    }
    TagEnd::Incomplete
}

fn classify(raw: &str) -> (TagKind, &str) {
    let inner = &raw[1..raw.len() - 1];
    if inner.starts_with('!') || inner.starts_with('?') {
        return (TagKind::Other, "");
    }
    if let Some(rest) = inner.strip_prefix('/') {
        return (TagKind::Close, element_name(rest));
    }
    if inner.trim_end().ends_with('/') {
        return (TagKind::SelfClosing, element_name(inner));
    }
    (TagKind::Open, element_name(inner))
}

fn element_name(s: &str) -> &str {
    s.split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
}
