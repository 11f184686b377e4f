//! Error types for hmap parsing.
//!
//! Every variant is malformed-input class: fatal for the whole import,
//! never partially recovered from. Tileset indices past the name table
//! are NOT a parse error - the rasterizer degrades those cells to gray.

use thiserror::Error;

/// Errors produced while parsing an hmap export stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HmapError {
    /// Stream does not start with the expected magic bytes
    #[error("bad magic header, not an hmap export")]
    BadMagic,

    /// Stream ended before a record was complete
    #[error("unexpected end of stream at offset {offset} reading {what}")]
    UnexpectedEof { offset: usize, what: &'static str },

    /// A length-prefixed string was not valid UTF-8
    #[error("invalid string at offset {offset}")]
    InvalidString { offset: usize },

    /// A record count exceeds the format's sanity bounds
    #[error("{what} count {count} exceeds limit {limit}")]
    CountOutOfRange {
        what: &'static str,
        count: usize,
        limit: usize,
    },
}
