//! Extraction from the Android color-bitmap-data table.

use std::path::Path;

use regex::Regex;

use crate::error::ExtractError;
use crate::tables::glyph_stream::{self, GlyphStream};
use crate::tables::FontTable;

/// Start of a format 17 glyph block, capturing the glyph name. Other CBDT
/// formats do not carry embedded PNG data and are not extracted.
const FORMAT_17_PATTERN: &str = r#"^<cbdt_bitmap_format_17 name="([^"]+)">$"#;
const DATA_END_PATTERN: &str = r"^</rawimagedata>$";

fn start_matcher() -> Regex {
    Regex::new(FORMAT_17_PATTERN).unwrap()
}

/// Determines the number of format 17 glyphs in a located CBDT dump. Must be
/// run before [`extract_glyph_data`] so progress has a denominator.
pub fn count_glyphs(cbdt_path: &Path) -> Result<usize, ExtractError> {
    glyph_stream::count_glyphs(cbdt_path, &start_matcher())
        .map_err(|_| ExtractError::TableNotFound(FontTable::Cbdt.tag().to_string()))
}

/// Streams the glyph image records of a located CBDT dump, one at a time in
/// discovery order.
pub fn extract_glyph_data(cbdt_path: &Path) -> Result<GlyphStream, ExtractError> {
    GlyphStream::open(
        cbdt_path,
        start_matcher(),
        Regex::new(DATA_END_PATTERN).unwrap(),
    )
    .map_err(|_| ExtractError::TableNotFound(FontTable::Cbdt.tag().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn missing_dump_is_table_not_found() {
        match count_glyphs(Path::new("/nonexistent/font.C_B_D_T_.ttx")) {
            Err(ExtractError::TableNotFound(tag)) => assert_eq!(tag, "CBDT"),
            other => panic!("expected TableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn only_format_17_blocks_are_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.C_B_D_T_.ttx");
        let mut file = File::create(&path).unwrap();
        file.write_all(
            br#"<CBDT>
  <cbdt_bitmap_format_18 name="ignored">
  </cbdt_bitmap_format_18>
  <cbdt_bitmap_format_17 name="kept">
    <rawimagedata>
      0102
    </rawimagedata>
  </cbdt_bitmap_format_17>
</CBDT>
"#,
        )
        .unwrap();

        assert_eq!(count_glyphs(&path).unwrap(), 1);
        let records: Vec<_> = extract_glyph_data(&path).unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "kept");
    }
}
