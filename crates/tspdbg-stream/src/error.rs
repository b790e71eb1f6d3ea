//! Decode error types.

use thiserror::Error;

/// Errors from decoding a completed control block.
///
/// Reassembly itself never fails: partial blocks simply keep accumulating.
/// These errors only arise once a block is complete but does not have the
/// expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The block is not well-formed markup.
    #[error("malformed block: {0}")]
    Xml(String),

    /// A required attribute was absent.
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        /// Element that lacks the attribute.
        element: &'static str,
        /// Name of the missing attribute.
        attribute: &'static str,
    },

    /// An attribute was present but could not be interpreted.
    #[error("<{element}> has invalid `{attribute}` value {value:?}")]
    InvalidAttribute {
        /// Element carrying the attribute.
        element: &'static str,
        /// Name of the attribute.
        attribute: &'static str,
        /// The offending raw value.
        value: String,
    },

    /// Two frames in one snapshot reported the same level.
    #[error("duplicate stack level {0}")]
    DuplicateLevel(u32),

    /// The block ended before its closing element.
    #[error("block ended before </{0}>")]
    Truncated(&'static str),

    /// A table payload was not valid JSON of the expected shape.
    #[error("invalid table payload: {0}")]
    Json(String),
}
