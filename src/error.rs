use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while decoding, encoding or repairing PNG chunk streams.
#[derive(Debug, Error)]
pub enum PngError {
    /// The 8-byte PNG signature did not match.
    #[error("not a valid PNG file; header does not match")]
    InvalidFormat,

    /// A chunk carried a name outside the recognized set. Downstream logic
    /// depends on exhaustive chunk classification, so these are never passed
    /// through silently.
    #[error("unrecognized chunk name: {0}")]
    UnknownChunkType(String),

    /// The byte stream ended in the middle of a chunk.
    #[error("unexpected end of chunk stream")]
    Truncated,

    /// The CgBI pixel pass failed for a single file.
    #[error("CgBI repair failed: {0}")]
    Repair(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors that abort a whole extraction run. Per-glyph and per-file problems
/// during streaming are logged and skipped instead of being raised as these.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("font file {} does not exist", .0.display())]
    FontMissing(PathBuf),

    /// The external font tool could not be launched, exited non-zero, or
    /// reported a fatal error on its output streams.
    #[error("font tools failed: {0}")]
    FontReadError(String),

    #[error("table '{0}' not found in the font dump")]
    TableNotFound(String),

    #[error("no cmap subtable with format {0}")]
    SubtableNotFound(u16),

    #[error("font carries neither an sbix table nor a CBLC/CBDT pair")]
    UnrecognizedFontType,

    /// A located table dump exists but its contents could not be parsed.
    #[error("malformed table dump: {0}")]
    InvalidTableDump(String),

    #[error(transparent)]
    Png(#[from] PngError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
