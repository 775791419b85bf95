//! Render failure codes.
//!
//! The codes form a fixed ABI: negative integers with a textual table indexed
//! by `-code`, mirrored by [`strerror`]. Missing data items and missing
//! partials are deliberately not represented as failures during a render
//! (both produce empty output); their codes exist so callers embedding the
//! engine can keep the historical numbering.

use thiserror::Error;

/// Everything that can abort a render.
///
/// Structural errors come from the template driver, resource and data errors
/// from the render state machine, and `System` from partial file IO. A render
/// that returns one of these discards its partially built output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderError {
    /// IO failure while reading a partial from disk.
    #[error("system error")]
    System,
    /// Template ended inside a tag or an open section.
    #[error("unexpected end of template")]
    UnexpectedEnd,
    #[error("empty tag")]
    EmptyTag,
    #[error("tag too long")]
    TagTooLong,
    /// Malformed delimiter-change tag.
    #[error("bad separators")]
    BadSeparators,
    #[error("section nesting too deep")]
    TooDeep,
    /// Closing tag without a matching open section.
    #[error("closing tag mismatch")]
    BadClose,
    /// `{` tag not closed by `}` plus the closing delimiter.
    #[error("bad unescape tag")]
    BadUnescape,
    /// Data is not valid JSON, or the root is neither null nor an object.
    #[error("invalid root")]
    InvalidRoot,
    /// Reserved: missing items render as empty instead of failing.
    #[error("item not found")]
    ItemNotFound,
    /// Reserved: missing partials render as empty instead of failing.
    #[error("partial not found")]
    PartialNotFound,
}

impl RenderError {
    /// The ABI error code for this failure (always negative).
    pub fn code(self) -> i32 {
        match self {
            RenderError::System => -1,
            RenderError::UnexpectedEnd => -2,
            RenderError::EmptyTag => -3,
            RenderError::TagTooLong => -4,
            RenderError::BadSeparators => -5,
            RenderError::TooDeep => -6,
            RenderError::BadClose => -7,
            RenderError::BadUnescape => -8,
            RenderError::InvalidRoot => -9,
            RenderError::ItemNotFound => -10,
            RenderError::PartialNotFound => -11,
        }
    }
}

/// Textual mapping for a render result code; `0` reports success.
///
/// The table is indexed by `-code`; anything outside the known range maps to
/// `"unknown error"`.
pub fn strerror(code: i32) -> &'static str {
    const TABLE: [&str; 12] = [
        "success",
        "system error",
        "unexpected end of template",
        "empty tag",
        "tag too long",
        "bad separators",
        "section nesting too deep",
        "closing tag mismatch",
        "bad unescape tag",
        "invalid root",
        "item not found",
        "partial not found",
    ];

    usize::try_from(-code)
        .ok()
        .and_then(|index| TABLE.get(index).copied())
        .unwrap_or("unknown error")
}
