//! Extraction from the Apple standard bitmap-glyph table.

use std::path::Path;

use regex::Regex;

use crate::error::ExtractError;
use crate::tables::glyph_stream::{self, GlyphStream};
use crate::tables::FontTable;

/// Start of a PNG-typed glyph block, capturing the glyph name. Glyphs with
/// other graphic types (`jpg `, `tiff`, `dupe`) carry no extractable PNG.
const PNG_GRAPHIC_TYPE_PATTERN: &str = r#"^<glyph graphicType="png " name="([^"]+)"#;
const DATA_END_PATTERN: &str = r"^</hexdata>$";

fn start_matcher() -> Regex {
    Regex::new(PNG_GRAPHIC_TYPE_PATTERN).unwrap()
}

/// Determines the number of PNG glyphs in a located sbix dump. Must be run
/// before [`extract_glyph_data`] so progress has a denominator.
pub fn count_glyphs(sbix_path: &Path) -> Result<usize, ExtractError> {
    glyph_stream::count_glyphs(sbix_path, &start_matcher())
        .map_err(|_| ExtractError::TableNotFound(FontTable::Sbix.tag().to_string()))
}

/// Streams the glyph image records of a located sbix dump, one at a time in
/// discovery order.
pub fn extract_glyph_data(sbix_path: &Path) -> Result<GlyphStream, ExtractError> {
    GlyphStream::open(
        sbix_path,
        start_matcher(),
        Regex::new(DATA_END_PATTERN).unwrap(),
    )
    .map_err(|_| ExtractError::TableNotFound(FontTable::Sbix.tag().to_string()))
}
